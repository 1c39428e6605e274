use super::status::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order status cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: OrderStatus,
        to: OrderStatus,
    },
}
