use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::lifecycle::Lifecycle;

// ============================================================================
// Review Entity
// ============================================================================

pub const STAR_MIN: i16 = 1;
pub const STAR_MAX: i16 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Always the store of the referenced order.
    pub store_id: Uuid,
    /// Always the user of the referenced order.
    pub user_id: Uuid,
    pub star: i16,
    pub comment: String,
    pub written_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

impl Review {
    pub fn new(
        order_id: Uuid,
        store_id: Uuid,
        user_id: Uuid,
        star: i16,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            store_id,
            user_id,
            star,
            comment: comment.into(),
            written_at: Utc::now(),
            lifecycle: Lifecycle::Active,
        }
    }
}

pub fn star_in_range(star: i16) -> bool {
    (STAR_MIN..=STAR_MAX).contains(&star)
}
