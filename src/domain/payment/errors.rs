use crate::storage::StorageError;

// ============================================================================
// Payment Business Rule Errors
// ============================================================================
//
// Ownership misses fold into the not-found variants so a requester cannot
// probe for records that exist but belong to someone else.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("User does not exist or has been withdrawn")]
    UserNotFound,

    #[error("Order does not exist or does not belong to the current user")]
    OrderNotFound,

    #[error("Card does not exist or does not belong to the current user")]
    CardNotFound,

    #[error("Payment record does not exist")]
    PaymentNotFound,

    #[error("Order has already been paid")]
    AlreadyPaid,

    #[error("Payment amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
