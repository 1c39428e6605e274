// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Payment ledger activity (registrations, soft deletions)
// - Review mutations by action
// - Rating deltas applied to store aggregates, by mode
// - Business-rule rejections (already paid, duplicate review, ...)
// - Operation latency
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Payment Ledger Metrics
    pub payments_registered: IntCounter,
    pub payments_deleted: IntCounter,

    // Review Metrics
    pub review_mutations: IntCounterVec,
    pub rating_deltas_applied: IntCounterVec,

    // Rule Enforcement Metrics
    pub rule_rejections: IntCounterVec,

    // Latency
    pub operation_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let payments_registered = IntCounter::new(
            "payments_registered_total",
            "Total payments registered against orders",
        )?;
        registry.register(Box::new(payments_registered.clone()))?;

        let payments_deleted = IntCounter::new(
            "payments_deleted_total",
            "Total payments soft-deleted",
        )?;
        registry.register(Box::new(payments_deleted.clone()))?;

        let review_mutations = IntCounterVec::new(
            Opts::new("review_mutations_total", "Review mutations by action"),
            &["action"],
        )?;
        registry.register(Box::new(review_mutations.clone()))?;

        let rating_deltas_applied = IntCounterVec::new(
            Opts::new(
                "rating_deltas_applied_total",
                "Signed rating deltas applied to store aggregates, by mode",
            ),
            &["mode"],
        )?;
        registry.register(Box::new(rating_deltas_applied.clone()))?;

        let rule_rejections = IntCounterVec::new(
            Opts::new(
                "rule_rejections_total",
                "Operations rejected by a business rule",
            ),
            &["rule"],
        )?;
        registry.register(Box::new(rule_rejections.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("operation_duration_seconds", "Core operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            registry,
            payments_registered,
            payments_deleted,
            review_mutations,
            rating_deltas_applied,
            rule_rejections,
            operation_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_payment_registered(&self) {
        self.payments_registered.inc();
    }

    pub fn record_payment_deleted(&self) {
        self.payments_deleted.inc();
    }

    pub fn record_review_mutation(&self, action: &str) {
        self.review_mutations.with_label_values(&[action]).inc();
    }

    pub fn record_rating_delta(&self, mode: &str) {
        self.rating_deltas_applied.with_label_values(&[mode]).inc();
    }

    pub fn record_rule_rejection(&self, rule: &str) {
        self.rule_rejections.with_label_values(&[rule]).inc();
    }

    pub fn observe_operation(&self, operation: &str, duration_secs: f64) {
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
