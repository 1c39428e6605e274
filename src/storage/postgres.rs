use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{PaymentStore, ReviewStore, StorageError};
use crate::directory::{CardDirectory, OrderDirectory, StoreDirectory, UserDirectory};
use crate::domain::card::Card;
use crate::domain::lifecycle::Lifecycle;
use crate::domain::order::{Order, OrderLine, OrderStatus, OrderType};
use crate::domain::page::{Page, PageRequest};
use crate::domain::payment::{Payment, PaymentSearch};
use crate::domain::review::Review;
use crate::domain::store::{RatingDelta, Store};
use crate::domain::user::{User, UserRole};

// ============================================================================
// Postgres Backend
// ============================================================================
//
// Explicit SQL, no ORM. The two invariants the services cannot enforce on
// their own are pushed into the schema:
//
// - at most one ACTIVE payment/review per order, via partial unique
//   indexes on (order_id) WHERE deleted_at IS NULL; a concurrent loser
//   surfaces as a 23505 and is mapped to DuplicateActive
// - the store rating aggregate moves only through relative updates
//   (rating_sum = rating_sum + delta) inside the review transaction
//
// ============================================================================

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        deleted_at TIMESTAMPTZ,
        deleted_by TEXT
    )",
    "CREATE TABLE IF NOT EXISTS stores (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        rating_sum BIGINT NOT NULL DEFAULT 0,
        review_count BIGINT NOT NULL DEFAULT 0,
        deleted_at TIMESTAMPTZ,
        deleted_by TEXT
    )",
    "CREATE TABLE IF NOT EXISTS cards (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        company TEXT NOT NULL,
        name TEXT NOT NULL,
        number TEXT NOT NULL,
        deleted_at TIMESTAMPTZ,
        deleted_by TEXT
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        store_id UUID NOT NULL REFERENCES stores(id),
        delivery_address_id UUID,
        order_type TEXT NOT NULL,
        status TEXT NOT NULL,
        requirements TEXT,
        ordered_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ,
        deleted_by TEXT
    )",
    "CREATE TABLE IF NOT EXISTS order_lines (
        order_id UUID NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
        product_id UUID NOT NULL,
        quantity INTEGER NOT NULL,
        PRIMARY KEY (order_id, product_id)
    )",
    "CREATE TABLE IF NOT EXISTS payments (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders(id),
        card_id UUID NOT NULL REFERENCES cards(id),
        user_id UUID NOT NULL REFERENCES users(id),
        amount BIGINT NOT NULL CHECK (amount > 0),
        paid_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ,
        deleted_by TEXT
    )",
    // Check-then-insert is racy at the application layer; the index is
    // what actually holds the at-most-one-active invariant.
    "CREATE UNIQUE INDEX IF NOT EXISTS payments_one_active_per_order
        ON payments (order_id) WHERE deleted_at IS NULL",
    "CREATE TABLE IF NOT EXISTS reviews (
        id UUID PRIMARY KEY,
        order_id UUID NOT NULL REFERENCES orders(id),
        store_id UUID NOT NULL REFERENCES stores(id),
        user_id UUID NOT NULL REFERENCES users(id),
        star SMALLINT NOT NULL CHECK (star BETWEEN 1 AND 5),
        comment TEXT NOT NULL,
        written_at TIMESTAMPTZ NOT NULL,
        deleted_at TIMESTAMPTZ,
        deleted_by TEXT
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS reviews_one_active_per_order
        ON reviews (order_id) WHERE deleted_at IS NULL",
];

const UNIQUE_VIOLATION: &str = "23505";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Idempotent schema bootstrap, run once at startup.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!(statements = SCHEMA.len(), "Schema bootstrap complete");
        Ok(())
    }

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, StorageError> {
        let rows = sqlx::query(
            "SELECT product_id, quantity FROM order_lines WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(OrderLine {
                    product_id: row.try_get("product_id")?,
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn hydrate_order(&self, row: Option<PgRow>) -> Result<Option<Order>, StorageError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut order = order_from_row(&row)?;
        order.lines = self.order_lines(order.id).await?;
        Ok(Some(order))
    }
}

fn map_insert_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StorageError::DuplicateActive
        }
        _ => StorageError::Database(e),
    }
}

/// The single mutation path for the store rating aggregate: a relative
/// update inside the caller's transaction, never load-then-save.
async fn apply_rating_delta(
    tx: &mut Transaction<'_, Postgres>,
    delta: RatingDelta,
) -> Result<(), StorageError> {
    let result = sqlx::query(
        "UPDATE stores
            SET rating_sum = rating_sum + $2, review_count = review_count + $3
          WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(delta.store_id)
    .bind(delta.stars)
    .bind(delta.mode.count_adjustment())
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::Corrupt(format!(
            "store {} missing while applying rating delta",
            delta.store_id
        )));
    }
    Ok(())
}

// ============================================================================
// Row Mapping
// ============================================================================

fn lifecycle_from_row(row: &PgRow) -> Result<Lifecycle, StorageError> {
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;
    let deleted_by: Option<String> = row.try_get("deleted_by")?;
    Ok(Lifecycle::from_columns(deleted_at, deleted_by))
}

fn user_from_row(row: &PgRow) -> Result<User, StorageError> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        role: UserRole::parse(&role)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown user role {role:?}")))?,
        lifecycle: lifecycle_from_row(row)?,
    })
}

fn store_from_row(row: &PgRow) -> Result<Store, StorageError> {
    Ok(Store {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        rating_sum: row.try_get("rating_sum")?,
        review_count: row.try_get("review_count")?,
        lifecycle: lifecycle_from_row(row)?,
    })
}

fn card_from_row(row: &PgRow) -> Result<Card, StorageError> {
    Ok(Card {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        company: row.try_get("company")?,
        name: row.try_get("name")?,
        number: row.try_get("number")?,
        lifecycle: lifecycle_from_row(row)?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, StorageError> {
    let order_type: String = row.try_get("order_type")?;
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        store_id: row.try_get("store_id")?,
        delivery_address_id: row.try_get("delivery_address_id")?,
        order_type: OrderType::parse(&order_type)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown order type {order_type:?}")))?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown order status {status:?}")))?,
        requirements: row.try_get("requirements")?,
        lines: Vec::new(),
        ordered_at: row.try_get("ordered_at")?,
        lifecycle: lifecycle_from_row(row)?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StorageError> {
    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        card_id: row.try_get("card_id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        paid_at: row.try_get("paid_at")?,
        lifecycle: lifecycle_from_row(row)?,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review, StorageError> {
    Ok(Review {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        store_id: row.try_get("store_id")?,
        user_id: row.try_get("user_id")?,
        star: row.try_get("star")?,
        comment: row.try_get("comment")?,
        written_at: row.try_get("written_at")?,
        lifecycle: lifecycle_from_row(row)?,
    })
}

// ============================================================================
// Directory Lookups
// ============================================================================

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_active_by_username(
        &self,
        username: &str,
    ) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            "SELECT id, username, role, deleted_at, deleted_by
               FROM users WHERE username = $1 AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl StoreDirectory for PgStore {
    async fn find_active_by_id(&self, store_id: Uuid) -> Result<Option<Store>, StorageError> {
        let row = sqlx::query(
            "SELECT id, name, rating_sum, review_count, deleted_at, deleted_by
               FROM stores WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(store_from_row).transpose()
    }
}

const ORDER_COLUMNS: &str = "id, user_id, store_id, delivery_address_id, order_type, status,
                             requirements, ordered_at, deleted_at, deleted_by";

#[async_trait]
impl OrderDirectory for PgStore {
    async fn find_active_by_id_and_user(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
              WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        ))
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_order(row).await
    }

    async fn find_active_by_id(&self, order_id: Uuid) -> Result<Option<Order>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate_order(row).await
    }
}

#[async_trait]
impl CardDirectory for PgStore {
    async fn find_active_by_id_and_user(
        &self,
        card_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Card>, StorageError> {
        let row = sqlx::query(
            "SELECT id, user_id, company, name, number, deleted_at, deleted_by
               FROM cards WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(card_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(card_from_row).transpose()
    }
}

// ============================================================================
// Payment Store
// ============================================================================

const PAYMENT_COLUMNS: &str =
    "id, order_id, card_id, user_id, amount, paid_at, deleted_at, deleted_by";

#[async_trait]
impl PaymentStore for PgStore {
    async fn commit_registration(
        &self,
        payment: &Payment,
        order_status: OrderStatus,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO payments (id, order_id, card_id, user_id, amount, paid_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.card_id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(payment.paid_at)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        let updated = sqlx::query(
            "UPDATE orders SET status = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(payment.order_id)
        .bind(order_status.as_str())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls the insert back
            return Err(StorageError::Corrupt(format!(
                "order {} missing while registering payment",
                payment.order_id
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_active_by_id_and_user(
        &self,
        payment_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Payment>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
              WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"
        ))
        .bind(payment_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn list_active_by_user(&self, user_id: Uuid) -> Result<Vec<Payment>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
              WHERE user_id = $1 AND deleted_at IS NULL
              ORDER BY paid_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn search_active_by_user(
        &self,
        user_id: Uuid,
        criteria: &PaymentSearch,
    ) -> Result<Vec<Payment>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
              WHERE user_id = $1 AND deleted_at IS NULL
                AND ($2::uuid IS NULL OR order_id = $2)
                AND ($3::uuid IS NULL OR card_id = $3)
                AND ($4::bigint IS NULL OR amount >= $4)
                AND ($5::bigint IS NULL OR amount <= $5)
                AND ($6::timestamptz IS NULL OR paid_at >= $6)
                AND ($7::timestamptz IS NULL OR paid_at <= $7)
              ORDER BY paid_at DESC"
        ))
        .bind(user_id)
        .bind(criteria.order_id)
        .bind(criteria.card_id)
        .bind(criteria.min_amount)
        .bind(criteria.max_amount)
        .bind(criteria.paid_after)
        .bind(criteria.paid_before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn soft_delete(
        &self,
        payment_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>, StorageError> {
        let row = sqlx::query(&format!(
            "UPDATE payments SET deleted_at = $2, deleted_by = $3
              WHERE id = $1 AND deleted_at IS NULL
              RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(at)
        .bind(deleted_by)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(payment_from_row).transpose()
    }
}

// ============================================================================
// Review Store
// ============================================================================

const REVIEW_COLUMNS: &str =
    "id, order_id, store_id, user_id, star, comment, written_at, deleted_at, deleted_by";

#[async_trait]
impl ReviewStore for PgStore {
    async fn find_active_by_id(&self, review_id: Uuid) -> Result<Option<Review>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(review_from_row).transpose()
    }

    async fn find_active_by_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Review>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE order_id = $1 AND deleted_at IS NULL"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(review_from_row).transpose()
    }

    async fn commit_create(
        &self,
        review: &Review,
        delta: RatingDelta,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO reviews (id, order_id, store_id, user_id, star, comment, written_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(review.id)
        .bind(review.order_id)
        .bind(review.store_id)
        .bind(review.user_id)
        .bind(review.star)
        .bind(&review.comment)
        .bind(review.written_at)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        apply_rating_delta(&mut tx, delta).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_update(
        &self,
        review_id: Uuid,
        star: i16,
        comment: &str,
        delta: RatingDelta,
    ) -> Result<Option<Review>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "UPDATE reviews SET star = $2, comment = $3
              WHERE id = $1 AND deleted_at IS NULL
              RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(review_id)
        .bind(star)
        .bind(comment)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let updated = review_from_row(&row)?;

        apply_rating_delta(&mut tx, delta).await?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn commit_delete(
        &self,
        review_id: Uuid,
        deleted_by: &str,
        at: DateTime<Utc>,
        delta: RatingDelta,
    ) -> Result<Option<Review>, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "UPDATE reviews SET deleted_at = $2, deleted_by = $3
              WHERE id = $1 AND deleted_at IS NULL
              RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(review_id)
        .bind(at)
        .bind(deleted_by)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let deleted = review_from_row(&row)?;

        apply_rating_delta(&mut tx, delta).await?;
        tx.commit().await?;
        Ok(Some(deleted))
    }

    async fn page_active_by_user(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<Page<Review>, StorageError> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM reviews
              WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews
              WHERE user_id = $1 AND deleted_at IS NULL
              ORDER BY written_at DESC
              LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(i64::from(request.size))
        .bind(request.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(review_from_row).collect::<Result<_, _>>()?;
        Ok(Page::new(items, request, total as u64))
    }

    async fn page_active_by_store(
        &self,
        store_id: Uuid,
        stars: &[i16],
        request: PageRequest,
    ) -> Result<Page<Review>, StorageError> {
        let stars = stars.to_vec();

        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS total FROM reviews
              WHERE store_id = $1 AND deleted_at IS NULL
                AND (cardinality($2::smallint[]) = 0 OR star = ANY($2))",
        )
        .bind(store_id)
        .bind(&stars)
        .fetch_one(&self.pool)
        .await?
        .try_get("total")?;

        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews
              WHERE store_id = $1 AND deleted_at IS NULL
                AND (cardinality($2::smallint[]) = 0 OR star = ANY($2))
              ORDER BY written_at DESC
              LIMIT $3 OFFSET $4"
        ))
        .bind(store_id)
        .bind(&stars)
        .bind(i64::from(request.size))
        .bind(request.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows.iter().map(review_from_row).collect::<Result<_, _>>()?;
        Ok(Page::new(items, request, total as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_enforces_active_uniqueness() {
        // The check-then-insert race is closed by the schema, not by
        // application checks; make sure the DDL keeps saying so.
        let ddl = SCHEMA.join("\n");
        assert!(ddl.contains("payments_one_active_per_order"));
        assert!(ddl.contains("reviews_one_active_per_order"));
        assert_eq!(ddl.matches("WHERE deleted_at IS NULL").count(), 2);
    }

    #[test]
    fn test_schema_constrains_domain_values() {
        let ddl = SCHEMA.join("\n");
        assert!(ddl.contains("CHECK (amount > 0)"));
        assert!(ddl.contains("CHECK (star BETWEEN 1 AND 5)"));
    }
}
