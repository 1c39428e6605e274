use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::order::OrderStatus;
use crate::domain::page::{Page, PageRequest};
use crate::domain::payment::{Payment, PaymentSearch};
use crate::domain::review::Review;
use crate::domain::store::RatingDelta;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ============================================================================
// Storage Layer - Transactional Seams
// ============================================================================
//
// Each method is one unit of work: either everything it names commits, or
// nothing does. The at-most-one-active-payment/review-per-order invariant
// is enforced HERE, not by the services' check-then-insert sequence, which
// cannot be trusted under concurrency. A violated constraint surfaces as
// `DuplicateActive`.
//
// The store rating aggregate is mutated only through the `RatingDelta`
// parameters of the review methods, inside the same transaction as the
// review row change, and always as a relative update against the persisted
// value.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("An active record already exists for this order")]
    DuplicateActive,

    #[error("Stored value could not be decoded: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Atomically persist the payment and move its order to `order_status`.
    async fn commit_registration(
        &self,
        payment: &Payment,
        order_status: OrderStatus,
    ) -> Result<(), StorageError>;

    async fn find_active_by_id_and_user(
        &self,
        payment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Payment>, StorageError>;

    async fn list_active_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, StorageError>;

    async fn search_active_by_user(
        &self,
        user_id: Uuid,
        criteria: &PaymentSearch,
    ) -> Result<Vec<Payment>, StorageError>;

    /// Soft-delete an active payment; `Ok(None)` when no active row matched.
    async fn soft_delete(
        &self,
        payment_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>, StorageError>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn find_active_by_id(&self, review_id: Uuid) -> Result<Option<Review>, StorageError>;

    async fn find_active_by_order(&self, order_id: Uuid) -> Result<Option<Review>, StorageError>;

    /// Atomically persist the review and apply its rating delta.
    async fn commit_create(&self, review: &Review, delta: RatingDelta)
        -> Result<(), StorageError>;

    /// Atomically re-rate an active review and apply the delta;
    /// `Ok(None)` when no active row matched.
    async fn commit_update(
        &self,
        review_id: Uuid,
        star: i16,
        comment: &str,
        delta: RatingDelta,
    ) -> Result<Option<Review>, StorageError>;

    /// Atomically soft-delete an active review and apply the delta;
    /// `Ok(None)` when no active row matched.
    async fn commit_delete(
        &self,
        review_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
        delta: RatingDelta,
    ) -> Result<Option<Review>, StorageError>;

    async fn page_active_by_user(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<Page<Review>, StorageError>;

    /// Active reviews for a store, optionally restricted to a star set.
    async fn page_active_by_store(
        &self,
        store_id: Uuid,
        stars: &[i16],
        request: PageRequest,
    ) -> Result<Page<Review>, StorageError>;
}
