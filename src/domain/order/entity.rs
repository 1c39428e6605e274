use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::OrderError;
use super::status::OrderStatus;
use crate::domain::lifecycle::Lifecycle;

// ============================================================================
// Order Entity
// ============================================================================
//
// Orders are created (and their line items edited) by the surrounding
// system; this core reads them and moves their status forward. An order has
// at most one active payment and at most one active review at any time,
// enforced at the storage layer.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub store_id: Uuid,
    pub delivery_address_id: Option<Uuid>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub requirements: Option<String>,
    pub lines: Vec<OrderLine>,
    pub ordered_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Delivery,
    Pickup,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Delivery => "DELIVERY",
            OrderType::Pickup => "PICKUP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DELIVERY" => Some(OrderType::Delivery),
            "PICKUP" => Some(OrderType::Pickup),
            _ => None,
        }
    }
}

impl Order {
    /// Move the order to `target`, failing when the state machine does not
    /// allow the step from the current status.
    pub fn transition(&mut self, target: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition(target) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        Ok(())
    }
}
