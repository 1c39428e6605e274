use serde::{Deserialize, Serialize};

// ============================================================================
// Order Status - State Machine
// ============================================================================
//
// AwaitingPayment -> PaymentComplete -> OrderComplete
//
// Cancelled is reachable from either non-terminal state. OrderComplete and
// Cancelled are terminal. Only the payment ledger and the fulfillment
// pipeline (outside this core) drive transitions.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    AwaitingPayment,
    PaymentComplete,
    OrderComplete,
    Cancelled,
}

impl OrderStatus {
    /// Pure transition predicate; the single source of truth for the graph.
    pub fn can_transition(self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (OrderStatus::AwaitingPayment, OrderStatus::PaymentComplete)
                | (OrderStatus::PaymentComplete, OrderStatus::OrderComplete)
                | (OrderStatus::AwaitingPayment, OrderStatus::Cancelled)
                | (OrderStatus::PaymentComplete, OrderStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::OrderComplete | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatus::PaymentComplete => "PAYMENT_COMPLETE",
            OrderStatus::OrderComplete => "ORDER_COMPLETE",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AWAITING_PAYMENT" => Some(OrderStatus::AwaitingPayment),
            "PAYMENT_COMPLETE" => Some(OrderStatus::PaymentComplete),
            "ORDER_COMPLETE" => Some(OrderStatus::OrderComplete),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}
