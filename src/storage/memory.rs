use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PaymentStore, ReviewStore, StorageError};
use crate::directory::{CardDirectory, OrderDirectory, StoreDirectory, UserDirectory};
use crate::domain::card::Card;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::page::{Page, PageRequest};
use crate::domain::payment::{Payment, PaymentSearch};
use crate::domain::review::Review;
use crate::domain::store::{RatingDelta, Store};
use crate::domain::user::User;

// ============================================================================
// In-Memory Backend
// ============================================================================
//
// One mutex over all tables. Every trait method is a single critical
// section, which gives the same all-or-nothing behavior as a database
// transaction and lets the duplicate-active checks stand in for the
// Postgres partial unique indexes. Used by the unit tests and the demo
// binary; not meant for production traffic.
//
// ============================================================================

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    stores: HashMap<Uuid, Store>,
    cards: HashMap<Uuid, Card>,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<Uuid, Payment>,
    reviews: HashMap<Uuid, Review>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    pub fn seed_user(&self, user: User) {
        self.lock().users.insert(user.id, user);
    }

    pub fn seed_store(&self, store: Store) {
        self.lock().stores.insert(store.id, store);
    }

    pub fn seed_card(&self, card: Card) {
        self.lock().cards.insert(card.id, card);
    }

    pub fn seed_order(&self, order: Order) {
        self.lock().orders.insert(order.id, order);
    }

    /// Stand-in for the out-of-scope fulfillment pipeline.
    pub fn set_order_status(&self, order_id: Uuid, status: OrderStatus) {
        if let Some(order) = self.lock().orders.get_mut(&order_id) {
            order.status = status;
        }
    }

    pub fn order_status(&self, order_id: Uuid) -> Option<OrderStatus> {
        self.lock().orders.get(&order_id).map(|o| o.status)
    }

    /// The (rating_sum, review_count) aggregate of a store.
    pub fn store_aggregate(&self, store_id: Uuid) -> Option<(i64, i64)> {
        self.lock()
            .stores
            .get(&store_id)
            .map(|s| (s.rating_sum, s.review_count))
    }
}

fn apply_delta(inner: &mut Inner, delta: RatingDelta) -> Result<(), StorageError> {
    let store = inner
        .stores
        .get_mut(&delta.store_id)
        .ok_or_else(|| StorageError::Corrupt(format!("store {} missing", delta.store_id)))?;

    store.rating_sum += delta.stars;
    store.review_count += delta.mode.count_adjustment();
    Ok(())
}

// ============================================================================
// Directory Lookups
// ============================================================================

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_active_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, StorageError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| u.username == username && u.lifecycle.is_active())
            .cloned())
    }
}

#[async_trait]
impl StoreDirectory for MemoryStore {
    async fn find_active_by_id(&self, store_id: Uuid) -> Result<Option<Store>, StorageError> {
        Ok(self
            .lock()
            .stores
            .get(&store_id)
            .filter(|s| s.lifecycle.is_active())
            .cloned())
    }
}

#[async_trait]
impl OrderDirectory for MemoryStore {
    async fn find_active_by_id_and_user(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Order>, StorageError> {
        Ok(self
            .lock()
            .orders
            .get(&order_id)
            .filter(|o| o.user_id == user_id && o.lifecycle.is_active())
            .cloned())
    }

    async fn find_active_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StorageError> {
        Ok(self
            .lock()
            .orders
            .get(&order_id)
            .filter(|o| o.lifecycle.is_active())
            .cloned())
    }
}

#[async_trait]
impl CardDirectory for MemoryStore {
    async fn find_active_by_id_and_user(
        &self,
        card_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Card>, StorageError> {
        Ok(self
            .lock()
            .cards
            .get(&card_id)
            .filter(|c| c.user_id == user_id && c.lifecycle.is_active())
            .cloned())
    }
}

// ============================================================================
// Payment Store
// ============================================================================

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn commit_registration(
        &self,
        payment: &Payment,
        order_status: OrderStatus,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();

        let duplicate = inner
            .payments
            .values()
            .any(|p| p.order_id == payment.order_id && p.lifecycle.is_active());
        if duplicate {
            return Err(StorageError::DuplicateActive);
        }

        let order = inner
            .orders
            .get_mut(&payment.order_id)
            .ok_or_else(|| StorageError::Corrupt(format!("order {} missing", payment.order_id)))?;
        order.status = order_status;

        inner.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_active_by_id_and_user(
        &self,
        payment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Payment>, StorageError> {
        Ok(self
            .lock()
            .payments
            .get(&payment_id)
            .filter(|p| p.user_id == user_id && p.lifecycle.is_active())
            .cloned())
    }

    async fn list_active_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, StorageError> {
        let mut payments: Vec<Payment> = self
            .lock()
            .payments
            .values()
            .filter(|p| p.user_id == user_id && p.lifecycle.is_active())
            .cloned()
            .collect();
        payments.sort_by_key(|p| std::cmp::Reverse(p.paid_at));
        Ok(payments)
    }

    async fn search_active_by_user(
        &self,
        user_id: Uuid,
        criteria: &PaymentSearch,
    ) -> Result<Vec<Payment>, StorageError> {
        let mut payments = self.list_active_by_user(user_id).await?;
        payments.retain(|p| criteria.matches(p));
        Ok(payments)
    }

    async fn soft_delete(
        &self,
        payment_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>, StorageError> {
        let mut inner = self.lock();
        let Some(payment) = inner.payments.get_mut(&payment_id) else {
            return Ok(None);
        };
        if !payment.lifecycle.is_active() {
            return Ok(None);
        }

        payment.lifecycle.delete(deleted_by, at);
        Ok(Some(payment.clone()))
    }
}

// ============================================================================
// Review Store
// ============================================================================

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn find_active_by_id(&self, review_id: Uuid) -> Result<Option<Review>, StorageError> {
        Ok(self
            .lock()
            .reviews
            .get(&review_id)
            .filter(|r| r.lifecycle.is_active())
            .cloned())
    }

    async fn find_active_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Review>, StorageError> {
        Ok(self
            .lock()
            .reviews
            .values()
            .find(|r| r.order_id == order_id && r.lifecycle.is_active())
            .cloned())
    }

    async fn commit_create(
        &self,
        review: &Review,
        delta: RatingDelta,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();

        let duplicate = inner
            .reviews
            .values()
            .any(|r| r.order_id == review.order_id && r.lifecycle.is_active());
        if duplicate {
            return Err(StorageError::DuplicateActive);
        }

        apply_delta(&mut inner, delta)?;
        inner.reviews.insert(review.id, review.clone());
        Ok(())
    }

    async fn commit_update(
        &self,
        review_id: Uuid,
        star: i16,
        comment: &str,
        delta: RatingDelta,
    ) -> Result<Option<Review>, StorageError> {
        let mut inner = self.lock();

        let Some(review) = inner.reviews.get_mut(&review_id) else {
            return Ok(None);
        };
        if !review.lifecycle.is_active() {
            return Ok(None);
        }

        review.star = star;
        review.comment = comment.to_string();
        let updated = review.clone();

        apply_delta(&mut inner, delta)?;
        Ok(Some(updated))
    }

    async fn commit_delete(
        &self,
        review_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
        delta: RatingDelta,
    ) -> Result<Option<Review>, StorageError> {
        let mut inner = self.lock();

        let Some(review) = inner.reviews.get_mut(&review_id) else {
            return Ok(None);
        };
        if !review.lifecycle.is_active() {
            return Ok(None);
        }

        review.lifecycle.delete(deleted_by, at);
        let deleted = review.clone();

        apply_delta(&mut inner, delta)?;
        Ok(Some(deleted))
    }

    async fn page_active_by_user(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<Page<Review>, StorageError> {
        let inner = self.lock();
        let mut matching: Vec<Review> = inner
            .reviews
            .values()
            .filter(|r| r.user_id == user_id && r.lifecycle.is_active())
            .cloned()
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.written_at));

        Ok(paginate(matching, request))
    }

    async fn page_active_by_store(
        &self,
        store_id: Uuid,
        stars: &[i16],
        request: PageRequest,
    ) -> Result<Page<Review>, StorageError> {
        let inner = self.lock();
        let mut matching: Vec<Review> = inner
            .reviews
            .values()
            .filter(|r| {
                r.store_id == store_id
                    && r.lifecycle.is_active()
                    && (stars.is_empty() || stars.contains(&r.star))
            })
            .cloned()
            .collect();
        matching.sort_by_key(|r| std::cmp::Reverse(r.written_at));

        Ok(paginate(matching, request))
    }
}

fn paginate(matching: Vec<Review>, request: PageRequest) -> Page<Review> {
    let total = matching.len() as u64;
    let items = matching
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.size as usize)
        .collect();
    Page::new(items, request, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::Lifecycle;
    use crate::domain::order::OrderType;
    use crate::domain::store::DeltaMode;

    fn seed_order_with_store(store: &MemoryStore) -> (Uuid, Uuid, Uuid) {
        let user_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let store_id = Uuid::new_v4();

        store.seed_store(Store {
            id: store_id,
            name: "Test Store".to_string(),
            rating_sum: 0,
            review_count: 0,
            lifecycle: Lifecycle::Active,
        });
        store.seed_order(Order {
            id: order_id,
            user_id,
            store_id,
            delivery_address_id: None,
            order_type: OrderType::Pickup,
            status: OrderStatus::AwaitingPayment,
            requirements: None,
            lines: vec![],
            ordered_at: Utc::now(),
            lifecycle: Lifecycle::Active,
        });

        (user_id, order_id, store_id)
    }

    #[tokio::test]
    async fn test_at_most_one_active_payment_per_order() {
        let store = MemoryStore::new();
        let (user_id, order_id, _) = seed_order_with_store(&store);

        let first = Payment::new(order_id, Uuid::new_v4(), user_id, 1000);
        store
            .commit_registration(&first, OrderStatus::PaymentComplete)
            .await
            .unwrap();

        let second = Payment::new(order_id, Uuid::new_v4(), user_id, 1000);
        let err = store
            .commit_registration(&second, OrderStatus::PaymentComplete)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateActive));
    }

    #[tokio::test]
    async fn test_soft_deleted_payment_frees_the_order_slot() {
        let store = MemoryStore::new();
        let (user_id, order_id, _) = seed_order_with_store(&store);

        let first = Payment::new(order_id, Uuid::new_v4(), user_id, 1000);
        store
            .commit_registration(&first, OrderStatus::PaymentComplete)
            .await
            .unwrap();
        store
            .soft_delete(first.id, "testuser", Utc::now())
            .await
            .unwrap()
            .unwrap();

        // The uniqueness rule covers ACTIVE payments only
        let second = Payment::new(order_id, Uuid::new_v4(), user_id, 1000);
        store
            .commit_registration(&second, OrderStatus::PaymentComplete)
            .await
            .unwrap();

        // The deleted row is retained for audit but invisible to lookups
        assert!(PaymentStore::find_active_by_id_and_user(&store, first.id, user_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_at_most_one_active_review_per_order() {
        let store = MemoryStore::new();
        let (user_id, order_id, store_id) = seed_order_with_store(&store);

        let first = Review::new(order_id, store_id, user_id, 4, "good");
        store
            .commit_create(&first, RatingDelta::create(store_id, 4))
            .await
            .unwrap();

        let second = Review::new(order_id, store_id, user_id, 5, "better");
        let err = store
            .commit_create(&second, RatingDelta::create(store_id, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateActive));

        // The rejected create left the aggregate untouched
        assert_eq!(store.store_aggregate(store_id), Some((4, 1)));
    }

    #[tokio::test]
    async fn test_rating_aggregate_tracks_delta_sequence() {
        let store = MemoryStore::new();
        let (user_id, order_id, store_id) = seed_order_with_store(&store);

        let review = Review::new(order_id, store_id, user_id, 5, "amazing");
        store
            .commit_create(&review, RatingDelta::create(store_id, 5))
            .await
            .unwrap();
        assert_eq!(store.store_aggregate(store_id), Some((5, 1)));

        store
            .commit_update(
                review.id,
                2,
                "cold",
                RatingDelta::update(store_id, 5, 2),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.store_aggregate(store_id), Some((2, 1)));

        store
            .commit_delete(
                review.id,
                "testuser",
                Utc::now(),
                RatingDelta::remove(store_id, 2),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.store_aggregate(store_id), Some((0, 0)));
    }

    #[tokio::test]
    async fn test_mutations_on_deleted_review_report_no_match() {
        let store = MemoryStore::new();
        let (user_id, order_id, store_id) = seed_order_with_store(&store);

        let review = Review::new(order_id, store_id, user_id, 3, "ok");
        store
            .commit_create(&review, RatingDelta::create(store_id, 3))
            .await
            .unwrap();
        store
            .commit_delete(
                review.id,
                "testuser",
                Utc::now(),
                RatingDelta::remove(store_id, 3),
            )
            .await
            .unwrap()
            .unwrap();

        let update = store
            .commit_update(review.id, 5, "late edit", RatingDelta {
                store_id,
                stars: 2,
                mode: DeltaMode::Update,
            })
            .await
            .unwrap();
        assert!(update.is_none());

        // No-match mutations must not move the aggregate
        assert_eq!(store.store_aggregate(store_id), Some((0, 0)));
    }

    #[tokio::test]
    async fn test_pagination_windows() {
        let store = MemoryStore::new();
        let (user_id, _, store_id) = seed_order_with_store(&store);

        for i in 0..5 {
            let order_id = Uuid::new_v4();
            store.seed_order(Order {
                id: order_id,
                user_id,
                store_id,
                delivery_address_id: None,
                order_type: OrderType::Delivery,
                status: OrderStatus::OrderComplete,
                requirements: None,
                lines: vec![],
                ordered_at: Utc::now(),
                lifecycle: Lifecycle::Active,
            });
            let review = Review::new(order_id, store_id, user_id, 4, format!("review {i}"));
            store
                .commit_create(&review, RatingDelta::create(store_id, 4))
                .await
                .unwrap();
        }

        let first = store
            .page_active_by_user(user_id, PageRequest::new(0, 2))
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total, 5);

        let last = store
            .page_active_by_user(user_id, PageRequest::new(2, 2))
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.total, 5);

        let beyond = store
            .page_active_by_user(user_id, PageRequest::new(5, 2))
            .await
            .unwrap();
        assert!(beyond.is_empty());
    }
}
