use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use delivery_core::config::Config;
use delivery_core::domain::card::Card;
use delivery_core::domain::lifecycle::Lifecycle;
use delivery_core::domain::order::{Order, OrderLine, OrderStatus, OrderType};
use delivery_core::domain::store::Store;
use delivery_core::domain::user::{User, UserRole};
use delivery_core::metrics::{start_metrics_server, Metrics};
use delivery_core::storage::{MemoryStore, PgStore};
use delivery_core::{PaymentLedger, ReviewAggregator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,delivery_core=debug")),
        )
        .init();

    tracing::info!("🚀 Starting delivery order lifecycle core");

    let config = Config::from_env()?;

    // === 1. Initialize Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!(
        "📊 Metrics registry created with {} metrics",
        metrics.registry().gather().len()
    );

    // Start metrics HTTP server in background thread
    let metrics_registry = Arc::new(metrics.registry().clone());
    let metrics_port = config.metrics_port;
    std::thread::spawn(move || {
        let rt = tokio::runtime::Runtime::new().expect("metrics runtime");
        rt.block_on(async {
            if let Err(e) = start_metrics_server(metrics_registry, metrics_port).await {
                tracing::error!("Metrics server error: {}", e);
            }
        });
    });

    // === 2. Pick a backend ===
    match config.database_url.clone() {
        Some(url) => run_against_postgres(&url, &config, metrics).await,
        None => run_lifecycle_demo(&config, metrics).await,
    }
}

/// Bootstrap the schema and hold the core services ready. The HTTP boundary
/// that would drive them is part of the surrounding system, not this crate.
async fn run_against_postgres(
    url: &str,
    config: &Config,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    tracing::info!("Connecting to Postgres...");
    let store = Arc::new(PgStore::connect(url).await?);
    store.init_schema().await?;

    let _ledger = PaymentLedger::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        metrics.clone(),
    );
    let _aggregator = ReviewAggregator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        metrics,
    )
    .with_empty_page_policy(config.empty_page_policy);

    tracing::info!("✅ Core services ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    Ok(())
}

/// Walk the full order lifecycle against the in-memory backend.
async fn run_lifecycle_demo(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<()> {
    tracing::info!("📝 No DATABASE_URL set, walking the order lifecycle in memory");

    let store = Arc::new(MemoryStore::new());

    let user_id = Uuid::new_v4();
    let card_id = Uuid::new_v4();
    let order_id = Uuid::new_v4();
    let store_id = Uuid::new_v4();

    store.seed_user(User {
        id: user_id,
        username: "demo_customer".to_string(),
        role: UserRole::Customer,
        lifecycle: Lifecycle::Active,
    });
    store.seed_store(Store {
        id: store_id,
        name: "Golden Fried Chicken".to_string(),
        rating_sum: 0,
        review_count: 0,
        lifecycle: Lifecycle::Active,
    });
    store.seed_card(Card {
        id: card_id,
        user_id,
        company: "Shinhan".to_string(),
        name: "Shinhan Check Card".to_string(),
        number: "4321".to_string(),
        lifecycle: Lifecycle::Active,
    });
    store.seed_order(Order {
        id: order_id,
        user_id,
        store_id,
        delivery_address_id: None,
        order_type: OrderType::Delivery,
        status: OrderStatus::AwaitingPayment,
        requirements: Some("Ring the bell twice".to_string()),
        lines: vec![
            OrderLine {
                product_id: Uuid::new_v4(),
                quantity: 1,
            },
            OrderLine {
                product_id: Uuid::new_v4(),
                quantity: 2,
            },
        ],
        ordered_at: Utc::now(),
        lifecycle: Lifecycle::Active,
    });

    let ledger = PaymentLedger::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        metrics.clone(),
    );
    let aggregator = ReviewAggregator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        metrics,
    )
    .with_empty_page_policy(config.empty_page_policy);

    // Pay for the order
    let payment = ledger
        .register_payment("demo_customer", card_id, order_id, 18900)
        .await?;
    tracing::info!("✅ Payment registered: {}", payment.id);

    // Fulfillment belongs to the surrounding system; stand in for it here
    store.set_order_status(order_id, OrderStatus::OrderComplete);
    tracing::info!("✅ Order fulfilled: {}", order_id);

    // Review the completed order
    let review = aggregator
        .create_review(order_id, 4, "Crispy and fast", "demo_customer")
        .await?;
    tracing::info!(
        "✅ Review created: {} (store aggregate now {:?})",
        review.id,
        store.store_aggregate(store_id)
    );

    let review = aggregator
        .update_review(review.id, 5, "Even better than last time", "demo_customer")
        .await?;
    tracing::info!(
        "✅ Review re-rated: {} (store aggregate now {:?})",
        review.id,
        store.store_aggregate(store_id)
    );

    aggregator
        .delete_review(review.id, "demo_customer")
        .await?;
    tracing::info!(
        "✅ Review removed (store aggregate back to {:?})",
        store.store_aggregate(store_id)
    );

    tracing::info!("🎉 Demo complete!");
    Ok(())
}
