use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::card::Card;
use crate::domain::order::Order;
use crate::domain::store::Store;
use crate::domain::user::User;
use crate::storage::StorageError;

// ============================================================================
// Directory Lookups - Collaborator Contracts
// ============================================================================
//
// Resolution of active (non-soft-deleted) records by identifier or
// username. The active-only predicate lives behind these traits; callers
// never see a deleted row. Every lookup returns `Ok(None)` on a miss so the
// calling service decides which not-found error to surface.
//
// ============================================================================

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_active_by_username(&self, username: &str)
        -> Result<Option<User>, StorageError>;
}

#[async_trait]
pub trait StoreDirectory: Send + Sync {
    async fn find_active_by_id(&self, store_id: Uuid) -> Result<Option<Store>, StorageError>;
}

#[async_trait]
pub trait OrderDirectory: Send + Sync {
    /// Resolve an order only when it belongs to the given user.
    async fn find_active_by_id_and_user(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Order>, StorageError>;

    /// Elevated-role variant without the ownership constraint.
    async fn find_active_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StorageError>;
}

#[async_trait]
pub trait CardDirectory: Send + Sync {
    async fn find_active_by_id_and_user(
        &self,
        card_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Card>, StorageError>;
}
