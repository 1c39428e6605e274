use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lifecycle::Lifecycle;

// ============================================================================
// Card - Payment Instrument Reference
// ============================================================================
//
// Card registration and editing belong to the surrounding system; the core
// only resolves active cards owned by the paying user.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company: String,
    pub name: String,
    pub number: String,
    pub lifecycle: Lifecycle,
}
