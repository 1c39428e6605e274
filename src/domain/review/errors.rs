use crate::domain::order::OrderStatus;
use crate::storage::StorageError;

// ============================================================================
// Review Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("User does not exist or has been withdrawn")]
    UserNotFound,

    #[error("Order does not exist or does not belong to the current user")]
    OrderNotFound,

    #[error("Store does not exist")]
    StoreNotFound,

    #[error("Review does not exist or is not owned by the current user")]
    ReviewNotFound,

    #[error("A review was already written for this order")]
    AlreadyExists,

    #[error("Reviews may only be written once the order is complete, current status is {status:?}")]
    NotAllowed { status: OrderStatus },

    #[error("Star rating must be between 1 and 5, got {0}")]
    InvalidStar(i16),

    #[error("The current user has not written any reviews")]
    NoneForUser,

    #[error("No reviews have been written for this store")]
    NoneForStore,

    #[error("No reviews for this store match the given star filter")]
    NoneMatchingFilter,

    #[error(transparent)]
    Storage(#[from] StorageError),
}
