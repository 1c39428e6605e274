use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Store Rating Deltas
// ============================================================================
//
// The store aggregate (rating_sum, review_count) is mutated only through
// signed deltas computed here and applied by the storage backend inside the
// same transaction as the review mutation that produced them. The stars
// delta is always added as-is; the mode only decides how it was computed
// and how the review count moves.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaMode {
    Create,
    Update,
    Remove,
}

impl DeltaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaMode::Create => "create",
            DeltaMode::Update => "update",
            DeltaMode::Remove => "remove",
        }
    }

    /// How the active review count moves alongside the star delta.
    pub fn count_adjustment(&self) -> i64 {
        match self {
            DeltaMode::Create => 1,
            DeltaMode::Update => 0,
            DeltaMode::Remove => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingDelta {
    pub store_id: Uuid,
    pub stars: i64,
    pub mode: DeltaMode,
}

impl RatingDelta {
    /// A newly written review contributes its full star value.
    pub fn create(store_id: Uuid, star: i16) -> Self {
        Self {
            store_id,
            stars: i64::from(star),
            mode: DeltaMode::Create,
        }
    }

    /// A re-rated review contributes the difference to the old star value.
    pub fn update(store_id: Uuid, old_star: i16, new_star: i16) -> Self {
        Self {
            store_id,
            stars: i64::from(new_star) - i64::from(old_star),
            mode: DeltaMode::Update,
        }
    }

    /// A removed review takes its full star value back out.
    pub fn remove(store_id: Uuid, star: i16) -> Self {
        Self {
            store_id,
            stars: -i64::from(star),
            mode: DeltaMode::Remove,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_delta_is_full_star_value() {
        let store_id = Uuid::new_v4();
        let delta = RatingDelta::create(store_id, 4);

        assert_eq!(delta.stars, 4);
        assert_eq!(delta.mode, DeltaMode::Create);
        assert_eq!(delta.mode.count_adjustment(), 1);
    }

    #[test]
    fn test_update_delta_is_difference() {
        let delta = RatingDelta::update(Uuid::new_v4(), 5, 2);

        assert_eq!(delta.stars, -3);
        assert_eq!(delta.mode.count_adjustment(), 0);
    }

    #[test]
    fn test_update_to_same_star_is_zero() {
        assert_eq!(RatingDelta::update(Uuid::new_v4(), 3, 3).stars, 0);
    }

    #[test]
    fn test_remove_delta_negates_star_value() {
        let delta = RatingDelta::remove(Uuid::new_v4(), 4);

        assert_eq!(delta.stars, -4);
        assert_eq!(delta.mode.count_adjustment(), -1);
    }

    #[test]
    fn test_create_then_remove_cancels_out() {
        let store_id = Uuid::new_v4();
        let created = RatingDelta::create(store_id, 5);
        let removed = RatingDelta::remove(store_id, 5);

        assert_eq!(created.stars + removed.stars, 0);
        assert_eq!(
            created.mode.count_adjustment() + removed.mode.count_adjustment(),
            0
        );
    }
}
