use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lifecycle::Lifecycle;

// ============================================================================
// Store Entity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    /// Sum of the star values of all active reviews for this store.
    pub rating_sum: i64,
    /// Count of active reviews for this store.
    pub review_count: i64,
    pub lifecycle: Lifecycle,
}

impl Store {
    /// Mean star rating over active reviews, `None` while unreviewed.
    pub fn average_rating(&self) -> Option<f64> {
        if self.review_count == 0 {
            None
        } else {
            Some(self.rating_sum as f64 / self.review_count as f64)
        }
    }
}
