use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use super::entity::{Payment, PaymentSearch};
use super::errors::PaymentError;
use crate::directory::{CardDirectory, OrderDirectory, UserDirectory};
use crate::domain::order::OrderStatus;
use crate::domain::user::User;
use crate::metrics::Metrics;
use crate::storage::{PaymentStore, StorageError};

// ============================================================================
// Payment Ledger
// ============================================================================
//
// Registers, queries, and soft-deletes payments, and is the only component
// (besides the out-of-scope fulfillment pipeline) that drives the order
// state machine. Registration is atomic: the payment row and the order
// status change commit together or not at all.
//
// ============================================================================

pub struct PaymentLedger {
    users: Arc<dyn UserDirectory>,
    orders: Arc<dyn OrderDirectory>,
    cards: Arc<dyn CardDirectory>,
    payments: Arc<dyn PaymentStore>,
    metrics: Arc<Metrics>,
}

impl PaymentLedger {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderDirectory>,
        cards: Arc<dyn CardDirectory>,
        payments: Arc<dyn PaymentStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            users,
            orders,
            cards,
            payments,
            metrics,
        }
    }

    /// Register a payment for an order that is awaiting one.
    ///
    /// Resolves the active user, the active order belonging to that user,
    /// and an active card belonging to that user; requires the order to be
    /// in `AwaitingPayment`; persists the payment and moves the order to
    /// `PaymentComplete` in one transaction.
    pub async fn register_payment(
        &self,
        username: &str,
        card_id: Uuid,
        order_id: Uuid,
        amount: i64,
    ) -> Result<Payment, PaymentError> {
        let started = Instant::now();

        let user = self.resolve_user(username).await?;
        let mut order = self
            .orders
            .find_active_by_id_and_user(order_id, user.id)
            .await?
            .ok_or(PaymentError::OrderNotFound)?;
        let card = self
            .cards
            .find_active_by_id_and_user(card_id, user.id)
            .await?
            .ok_or(PaymentError::CardNotFound)?;

        if amount <= 0 {
            return Err(PaymentError::InvalidAmount(amount));
        }

        // The state machine is the arbiter: only AwaitingPayment may move
        // to PaymentComplete, so a rejected transition means the order was
        // already paid (or is past payment entirely).
        order
            .transition(OrderStatus::PaymentComplete)
            .map_err(|_| {
                self.metrics.record_rule_rejection("already_paid");
                PaymentError::AlreadyPaid
            })?;

        let payment = Payment::new(order.id, card.id, user.id, amount);
        self.payments
            .commit_registration(&payment, order.status)
            .await
            .map_err(|e| match e {
                // A concurrent registration won the partial unique index
                StorageError::DuplicateActive => PaymentError::AlreadyPaid,
                other => PaymentError::Storage(other),
            })?;

        self.metrics.record_payment_registered();
        self.metrics
            .observe_operation("register_payment", started.elapsed().as_secs_f64());
        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            username = %username,
            amount = payment.amount,
            "Payment registered, order moved to PaymentComplete"
        );

        Ok(payment)
    }

    /// The active payment with the given id, owned by the requester.
    pub async fn get_payment(
        &self,
        payment_id: Uuid,
        username: &str,
    ) -> Result<Payment, PaymentError> {
        let user = self.resolve_user(username).await?;
        self.payments
            .find_active_by_id_and_user(payment_id, user.id)
            .await?
            .ok_or(PaymentError::PaymentNotFound)
    }

    /// All active payments of the requester; an empty history is not an
    /// error.
    pub async fn list_payments(&self, username: &str) -> Result<Vec<Payment>, PaymentError> {
        let user = self.resolve_user(username).await?;
        Ok(self.payments.list_active_by_user(user.id).await?)
    }

    /// Filtered listing; a missing or empty filter behaves exactly like
    /// `list_payments`.
    pub async fn search_payments(
        &self,
        criteria: Option<PaymentSearch>,
        username: &str,
    ) -> Result<Vec<Payment>, PaymentError> {
        let user = self.resolve_user(username).await?;

        match criteria {
            None => Ok(self.payments.list_active_by_user(user.id).await?),
            Some(criteria) if criteria.is_empty() => {
                Ok(self.payments.list_active_by_user(user.id).await?)
            }
            Some(criteria) => Ok(self
                .payments
                .search_active_by_user(user.id, &criteria)
                .await?),
        }
    }

    /// Soft-delete an active payment owned by the requester.
    ///
    /// The associated order keeps its status; reverting it on refund is a
    /// decision for the system owner and deliberately not taken here.
    pub async fn delete_payment(
        &self,
        payment_id: Uuid,
        username: &str,
    ) -> Result<Payment, PaymentError> {
        let user = self.resolve_user(username).await?;

        // Ownership check first so a foreign payment id reads as not-found
        self.payments
            .find_active_by_id_and_user(payment_id, user.id)
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        let deleted = self
            .payments
            .soft_delete(payment_id, username, Utc::now())
            .await?
            .ok_or(PaymentError::PaymentNotFound)?;

        self.metrics.record_payment_deleted();
        tracing::info!(
            payment_id = %payment_id,
            username = %username,
            "Payment soft-deleted"
        );

        Ok(deleted)
    }

    async fn resolve_user(&self, username: &str) -> Result<User, PaymentError> {
        self.users
            .find_active_by_username(username)
            .await?
            .ok_or(PaymentError::UserNotFound)
    }
}
