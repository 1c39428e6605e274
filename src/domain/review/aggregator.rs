use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use super::entity::{star_in_range, Review};
use super::errors::ReviewError;
use crate::directory::{OrderDirectory, StoreDirectory, UserDirectory};
use crate::domain::order::OrderStatus;
use crate::domain::page::{Page, PageRequest};
use crate::domain::store::RatingDelta;
use crate::domain::user::{can_access, User};
use crate::metrics::Metrics;
use crate::storage::{ReviewStore, StorageError};

// ============================================================================
// Review Aggregator
// ============================================================================
//
// Enforces review eligibility (order complete, at most one active review
// per order), ownership on edits, and computes the rating delta the storage
// backend applies to the store aggregate in the same transaction as the
// review mutation.
//
// ============================================================================

/// What a read path does when its result page comes back empty. `Error`
/// reports the miss to the caller; `Allow` returns the empty page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyPagePolicy {
    #[default]
    Error,
    Allow,
}

pub struct ReviewAggregator {
    users: Arc<dyn UserDirectory>,
    orders: Arc<dyn OrderDirectory>,
    stores: Arc<dyn StoreDirectory>,
    reviews: Arc<dyn ReviewStore>,
    metrics: Arc<Metrics>,
    empty_page_policy: EmptyPagePolicy,
}

impl ReviewAggregator {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        orders: Arc<dyn OrderDirectory>,
        stores: Arc<dyn StoreDirectory>,
        reviews: Arc<dyn ReviewStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            users,
            orders,
            stores,
            reviews,
            metrics,
            empty_page_policy: EmptyPagePolicy::default(),
        }
    }

    pub fn with_empty_page_policy(mut self, policy: EmptyPagePolicy) -> Self {
        self.empty_page_policy = policy;
        self
    }

    /// Write a review for a completed order of the requester.
    pub async fn create_review(
        &self,
        order_id: Uuid,
        star: i16,
        comment: &str,
        username: &str,
    ) -> Result<Review, ReviewError> {
        let started = Instant::now();

        let user = self.resolve_user(username).await?;
        let order = self
            .orders
            .find_active_by_id_and_user(order_id, user.id)
            .await?
            .ok_or(ReviewError::OrderNotFound)?;
        let store = self
            .stores
            .find_active_by_id(order.store_id)
            .await?
            .ok_or(ReviewError::StoreNotFound)?;

        if !star_in_range(star) {
            return Err(ReviewError::InvalidStar(star));
        }

        if self.reviews.find_active_by_order(order.id).await?.is_some() {
            self.metrics.record_rule_rejection("review_already_exists");
            return Err(ReviewError::AlreadyExists);
        }

        if order.status != OrderStatus::OrderComplete {
            self.metrics.record_rule_rejection("review_not_allowed");
            return Err(ReviewError::NotAllowed {
                status: order.status,
            });
        }

        let review = Review::new(order.id, store.id, user.id, star, comment);
        let delta = RatingDelta::create(store.id, star);
        self.reviews
            .commit_create(&review, delta)
            .await
            .map_err(|e| match e {
                // A concurrent create won the partial unique index
                StorageError::DuplicateActive => ReviewError::AlreadyExists,
                other => ReviewError::Storage(other),
            })?;

        self.metrics.record_review_mutation("created");
        self.metrics.record_rating_delta(delta.mode.as_str());
        self.metrics
            .observe_operation("create_review", started.elapsed().as_secs_f64());
        tracing::info!(
            review_id = %review.id,
            order_id = %order.id,
            store_id = %store.id,
            star = star,
            "Review created"
        );

        Ok(review)
    }

    /// Re-rate an existing review. Customers may only touch their own;
    /// elevated roles may touch any.
    pub async fn update_review(
        &self,
        review_id: Uuid,
        star: i16,
        comment: &str,
        username: &str,
    ) -> Result<Review, ReviewError> {
        let started = Instant::now();

        let user = self.resolve_user(username).await?;
        let review = self.resolve_owned_review(review_id, &user).await?;

        if !star_in_range(star) {
            return Err(ReviewError::InvalidStar(star));
        }

        let delta = RatingDelta::update(review.store_id, review.star, star);
        let updated = self
            .reviews
            .commit_update(review.id, star, comment, delta)
            .await?
            .ok_or(ReviewError::ReviewNotFound)?;

        self.metrics.record_review_mutation("updated");
        self.metrics.record_rating_delta(delta.mode.as_str());
        self.metrics
            .observe_operation("update_review", started.elapsed().as_secs_f64());
        tracing::info!(
            review_id = %review.id,
            store_id = %review.store_id,
            old_star = review.star,
            new_star = star,
            "Review updated"
        );

        Ok(updated)
    }

    /// Soft-delete a review and take its stars back out of the store
    /// aggregate. Same ownership rule as `update_review`.
    pub async fn delete_review(
        &self,
        review_id: Uuid,
        username: &str,
    ) -> Result<Review, ReviewError> {
        let started = Instant::now();

        let user = self.resolve_user(username).await?;
        let review = self.resolve_owned_review(review_id, &user).await?;

        let delta = RatingDelta::remove(review.store_id, review.star);
        let deleted = self
            .reviews
            .commit_delete(review.id, username, Utc::now(), delta)
            .await?
            .ok_or(ReviewError::ReviewNotFound)?;

        self.metrics.record_review_mutation("deleted");
        self.metrics.record_rating_delta(delta.mode.as_str());
        self.metrics
            .observe_operation("delete_review", started.elapsed().as_secs_f64());
        tracing::info!(
            review_id = %review.id,
            store_id = %review.store_id,
            star = review.star,
            "Review soft-deleted"
        );

        Ok(deleted)
    }

    /// One page of the requester's active reviews.
    pub async fn list_user_reviews(
        &self,
        username: &str,
        request: PageRequest,
    ) -> Result<Page<Review>, ReviewError> {
        let user = self.resolve_user(username).await?;
        let page = self.reviews.page_active_by_user(user.id, request).await?;

        if page.is_empty() && self.empty_page_policy == EmptyPagePolicy::Error {
            return Err(ReviewError::NoneForUser);
        }

        Ok(page)
    }

    /// One page of a store's active reviews, optionally restricted to a set
    /// of star values. The two empty outcomes are reported distinctly so
    /// the caller can tell "nothing written" from "nothing matching".
    pub async fn search_store_reviews(
        &self,
        store_id: Uuid,
        stars: &[i16],
        request: PageRequest,
    ) -> Result<Page<Review>, ReviewError> {
        let store = self
            .stores
            .find_active_by_id(store_id)
            .await?
            .ok_or(ReviewError::StoreNotFound)?;

        let page = self
            .reviews
            .page_active_by_store(store.id, stars, request)
            .await?;

        if page.is_empty() && self.empty_page_policy == EmptyPagePolicy::Error {
            return Err(if stars.is_empty() {
                ReviewError::NoneForStore
            } else {
                ReviewError::NoneMatchingFilter
            });
        }

        Ok(page)
    }

    async fn resolve_user(&self, username: &str) -> Result<User, ReviewError> {
        self.users
            .find_active_by_username(username)
            .await?
            .ok_or(ReviewError::UserNotFound)
    }

    /// Fetch a review and apply the ownership policy. A review the
    /// requester may not touch reads as not-found so its existence does not
    /// leak.
    async fn resolve_owned_review(
        &self,
        review_id: Uuid,
        user: &User,
    ) -> Result<Review, ReviewError> {
        let review = self
            .reviews
            .find_active_by_id(review_id)
            .await?
            .ok_or(ReviewError::ReviewNotFound)?;

        if !can_access(user.role, user.id, review.user_id) {
            return Err(ReviewError::ReviewNotFound);
        }

        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lifecycle::Lifecycle;
    use crate::domain::order::{Order, OrderType};
    use crate::domain::store::Store;
    use crate::domain::user::UserRole;
    use crate::storage::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        aggregator: ReviewAggregator,
        order_id: Uuid,
        store_id: Uuid,
    }

    fn create_fixture(order_status: OrderStatus) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        let order_id = Uuid::new_v4();
        let store_id = Uuid::new_v4();

        store.seed_user(User {
            id: user_id,
            username: "testuser".to_string(),
            role: UserRole::Customer,
            lifecycle: Lifecycle::Active,
        });
        store.seed_user(User {
            id: Uuid::new_v4(),
            username: "othercustomer".to_string(),
            role: UserRole::Customer,
            lifecycle: Lifecycle::Active,
        });
        store.seed_user(User {
            id: Uuid::new_v4(),
            username: "manager".to_string(),
            role: UserRole::Manager,
            lifecycle: Lifecycle::Active,
        });
        store.seed_store(Store {
            id: store_id,
            name: "Mama Kim's Kitchen".to_string(),
            rating_sum: 0,
            review_count: 0,
            lifecycle: Lifecycle::Active,
        });
        store.seed_order(Order {
            id: order_id,
            user_id,
            store_id,
            delivery_address_id: None,
            order_type: OrderType::Delivery,
            status: order_status,
            requirements: None,
            lines: vec![],
            ordered_at: Utc::now(),
            lifecycle: Lifecycle::Active,
        });

        let metrics = Arc::new(Metrics::new().unwrap());
        let aggregator = ReviewAggregator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            metrics,
        );

        Fixture {
            store,
            aggregator,
            order_id,
            store_id,
        }
    }

    #[tokio::test]
    async fn test_create_review_adds_stars_to_aggregate() {
        let fx = create_fixture(OrderStatus::OrderComplete);

        let review = fx
            .aggregator
            .create_review(fx.order_id, 4, "great chicken", "testuser")
            .await
            .unwrap();

        assert_eq!(review.star, 4);
        assert_eq!(review.store_id, fx.store_id);
        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((4, 1)));
    }

    #[tokio::test]
    async fn test_second_review_for_same_order_rejected() {
        let fx = create_fixture(OrderStatus::OrderComplete);

        fx.aggregator
            .create_review(fx.order_id, 4, "great", "testuser")
            .await
            .unwrap();

        let err = fx
            .aggregator
            .create_review(fx.order_id, 5, "again", "testuser")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::AlreadyExists));

        // Aggregate unchanged by the rejected attempt
        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((4, 1)));
    }

    #[tokio::test]
    async fn test_review_requires_completed_order() {
        for status in [
            OrderStatus::AwaitingPayment,
            OrderStatus::PaymentComplete,
            OrderStatus::Cancelled,
        ] {
            let fx = create_fixture(status);

            let err = fx
                .aggregator
                .create_review(fx.order_id, 4, "too early", "testuser")
                .await
                .unwrap_err();
            assert!(matches!(err, ReviewError::NotAllowed { status: s } if s == status));
            assert_eq!(fx.store.store_aggregate(fx.store_id), Some((0, 0)));
        }
    }

    #[tokio::test]
    async fn test_create_review_rejects_out_of_range_star() {
        let fx = create_fixture(OrderStatus::OrderComplete);

        for star in [0, 6, -2] {
            let err = fx
                .aggregator
                .create_review(fx.order_id, star, "bad star", "testuser")
                .await
                .unwrap_err();
            assert!(matches!(err, ReviewError::InvalidStar(s) if s == star));
        }
    }

    #[tokio::test]
    async fn test_create_review_foreign_order() {
        let fx = create_fixture(OrderStatus::OrderComplete);

        let err = fx
            .aggregator
            .create_review(fx.order_id, 4, "not mine", "othercustomer")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::OrderNotFound));
    }

    #[tokio::test]
    async fn test_update_review_applies_star_difference() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        let review = fx
            .aggregator
            .create_review(fx.order_id, 5, "amazing", "testuser")
            .await
            .unwrap();

        let updated = fx
            .aggregator
            .update_review(review.id, 2, "cold on arrival", "testuser")
            .await
            .unwrap();

        assert_eq!(updated.star, 2);
        assert_eq!(updated.comment, "cold on arrival");
        // 5 -> 2 moves the aggregate by exactly -3, count unchanged
        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((2, 1)));
    }

    #[tokio::test]
    async fn test_customer_cannot_touch_foreign_review() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        let review = fx
            .aggregator
            .create_review(fx.order_id, 4, "mine", "testuser")
            .await
            .unwrap();

        let err = fx
            .aggregator
            .update_review(review.id, 1, "sabotage", "othercustomer")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::ReviewNotFound));

        let err = fx
            .aggregator
            .delete_review(review.id, "othercustomer")
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::ReviewNotFound));

        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((4, 1)));
    }

    #[tokio::test]
    async fn test_elevated_role_bypasses_ownership() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        let review = fx
            .aggregator
            .create_review(fx.order_id, 4, "mine", "testuser")
            .await
            .unwrap();

        let updated = fx
            .aggregator
            .update_review(review.id, 3, "moderated", "manager")
            .await
            .unwrap();
        assert_eq!(updated.star, 3);
        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((3, 1)));
    }

    #[tokio::test]
    async fn test_delete_review_takes_stars_back_out() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        let review = fx
            .aggregator
            .create_review(fx.order_id, 4, "good", "testuser")
            .await
            .unwrap();
        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((4, 1)));

        let deleted = fx
            .aggregator
            .delete_review(review.id, "testuser")
            .await
            .unwrap();
        assert!(!deleted.lifecycle.is_active());
        assert_eq!(deleted.lifecycle.deleted_by(), Some("testuser"));

        // Back to the prior aggregate
        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((0, 0)));
    }

    #[tokio::test]
    async fn test_review_again_after_delete_is_allowed() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        let review = fx
            .aggregator
            .create_review(fx.order_id, 4, "good", "testuser")
            .await
            .unwrap();
        fx.aggregator
            .delete_review(review.id, "testuser")
            .await
            .unwrap();

        // Only ACTIVE reviews count toward the one-per-order rule
        let second = fx
            .aggregator
            .create_review(fx.order_id, 5, "changed my mind", "testuser")
            .await
            .unwrap();
        assert_eq!(second.star, 5);
        assert_eq!(fx.store.store_aggregate(fx.store_id), Some((5, 1)));
    }

    #[tokio::test]
    async fn test_list_user_reviews_empty_page_is_error_by_default() {
        let fx = create_fixture(OrderStatus::OrderComplete);

        let err = fx
            .aggregator
            .list_user_reviews("testuser", PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NoneForUser));
    }

    #[tokio::test]
    async fn test_list_user_reviews_allow_policy_returns_empty_page() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        let aggregator = ReviewAggregator::new(
            fx.store.clone(),
            fx.store.clone(),
            fx.store.clone(),
            fx.store.clone(),
            Arc::new(Metrics::new().unwrap()),
        )
        .with_empty_page_policy(EmptyPagePolicy::Allow);

        let page = aggregator
            .list_user_reviews("testuser", PageRequest::default())
            .await
            .unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_list_user_reviews_returns_page() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        fx.aggregator
            .create_review(fx.order_id, 4, "good", "testuser")
            .await
            .unwrap();

        let page = fx
            .aggregator
            .list_user_reviews("testuser", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_search_store_reviews_distinct_empty_messages() {
        let fx = create_fixture(OrderStatus::OrderComplete);

        let err = fx
            .aggregator
            .search_store_reviews(fx.store_id, &[], PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NoneForStore));

        let err = fx
            .aggregator
            .search_store_reviews(fx.store_id, &[5], PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NoneMatchingFilter));
    }

    #[tokio::test]
    async fn test_search_store_reviews_star_filter() {
        let fx = create_fixture(OrderStatus::OrderComplete);
        fx.aggregator
            .create_review(fx.order_id, 4, "good", "testuser")
            .await
            .unwrap();

        let page = fx
            .aggregator
            .search_store_reviews(fx.store_id, &[4, 5], PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);

        let err = fx
            .aggregator
            .search_store_reviews(fx.store_id, &[1, 2], PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::NoneMatchingFilter));
    }

    #[tokio::test]
    async fn test_search_unknown_store() {
        let fx = create_fixture(OrderStatus::OrderComplete);

        let err = fx
            .aggregator
            .search_store_reviews(Uuid::new_v4(), &[], PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::StoreNotFound));
    }
}
