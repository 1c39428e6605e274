use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lifecycle::Lifecycle;

// ============================================================================
// Payment Entity
// ============================================================================
//
// An internal ledger entry, not an external settlement. Created once per
// order while the order awaits payment, soft-deleted on cancellation or
// refund request, never hard-deleted.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub card_id: Uuid,
    pub user_id: Uuid,
    /// Positive amount in the minor currency unit.
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

impl Payment {
    pub fn new(order_id: Uuid, card_id: Uuid, user_id: Uuid, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            card_id,
            user_id,
            amount,
            paid_at: Utc::now(),
            lifecycle: Lifecycle::Active,
        }
    }
}

/// Filter for the payment search path. An empty filter matches everything,
/// making search behave exactly like the plain listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSearch {
    pub order_id: Option<Uuid>,
    pub card_id: Option<Uuid>,
    pub min_amount: Option<i64>,
    pub max_amount: Option<i64>,
    pub paid_after: Option<DateTime<Utc>>,
    pub paid_before: Option<DateTime<Utc>>,
}

impl PaymentSearch {
    pub fn is_empty(&self) -> bool {
        self.order_id.is_none()
            && self.card_id.is_none()
            && self.min_amount.is_none()
            && self.max_amount.is_none()
            && self.paid_after.is_none()
            && self.paid_before.is_none()
    }

    /// Whether a payment satisfies every supplied bound.
    pub fn matches(&self, payment: &Payment) -> bool {
        self.order_id.is_none_or(|id| payment.order_id == id)
            && self.card_id.is_none_or(|id| payment.card_id == id)
            && self.min_amount.is_none_or(|min| payment.amount >= min)
            && self.max_amount.is_none_or(|max| payment.amount <= max)
            && self.paid_after.is_none_or(|t| payment.paid_at >= t)
            && self.paid_before.is_none_or(|t| payment.paid_at <= t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_search_matches_any_payment() {
        let payment = Payment::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 10000);
        let search = PaymentSearch::default();

        assert!(search.is_empty());
        assert!(search.matches(&payment));
    }

    #[test]
    fn test_search_amount_bounds() {
        let payment = Payment::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 10000);

        let search = PaymentSearch {
            min_amount: Some(5000),
            max_amount: Some(15000),
            ..Default::default()
        };
        assert!(!search.is_empty());
        assert!(search.matches(&payment));

        let search = PaymentSearch {
            min_amount: Some(20000),
            ..Default::default()
        };
        assert!(!search.matches(&payment));
    }

    #[test]
    fn test_search_by_order() {
        let order_id = Uuid::new_v4();
        let payment = Payment::new(order_id, Uuid::new_v4(), Uuid::new_v4(), 9000);

        let search = PaymentSearch {
            order_id: Some(order_id),
            ..Default::default()
        };
        assert!(search.matches(&payment));

        let search = PaymentSearch {
            order_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(!search.matches(&payment));
    }
}
