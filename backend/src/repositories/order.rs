//! Order repository.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::address::Address;
use crate::models::order::{Order, OrderItem};
use crate::types::{AddressId, OrderId, UserId};

pub const ORDER_ALREADY_CREATED: &str = "Order already created for this payment intent";

const ORDER_COLUMNS: &str =
    "id, user_id, address_id, payment_intent_id, total_cents, currency, status, created_at";
const ITEM_COLUMNS: &str = "id, order_id, model_id, size_id, quantity, unit_price_cents";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, AppError>;

    /// Inserts the order and all of its items atomically.
    ///
    /// `new_address`, when given, is stored in the same transaction and the
    /// order points at it (or at the caller's address that already holds its
    /// name). A second order for the same payment intent fails with
    /// `AppError::Conflict(ORDER_ALREADY_CREATED)`.
    async fn create_with_items(
        &self,
        order: &Order,
        items: &[OrderItem],
        new_address: Option<Address>,
    ) -> Result<Order, AppError>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, AppError>;

    async fn find_for_user(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>, AppError>;

    async fn list_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, AppError>;

    /// Page of every order, newest first, plus the total count.
    async fn list_all(&self, limit: i64, offset: i64) -> Result<(Vec<Order>, i64), AppError>;
}

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error) -> AppError {
    match err {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(ORDER_ALREADY_CREATED.to_string())
        }
        other => other.into(),
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, AppError> {
        let query = format!(
            "SELECT {} FROM orders WHERE payment_intent_id = $1",
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, Order>(&query)
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create_with_items(
        &self,
        order: &Order,
        items: &[OrderItem],
        new_address: Option<Address>,
    ) -> Result<Order, AppError> {
        let mut tx = self.pool.begin().await?;

        let address_id = match new_address {
            Some(address) => {
                sqlx::query(
                    "INSERT INTO addresses \
                     (id, user_id, name, street, city, postal_code, country, phone, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
                     ON CONFLICT (user_id, name) DO NOTHING",
                )
                .bind(address.id)
                .bind(address.user_id)
                .bind(&address.name)
                .bind(&address.street)
                .bind(&address.city)
                .bind(&address.postal_code)
                .bind(&address.country)
                .bind(&address.phone)
                .bind(address.created_at)
                .bind(address.updated_at)
                .execute(&mut *tx)
                .await?;

                sqlx::query_scalar::<_, AddressId>(
                    "SELECT id FROM addresses WHERE user_id = $1 AND name = $2",
                )
                .bind(address.user_id)
                .bind(&address.name)
                .fetch_one(&mut *tx)
                .await?
            }
            None => order.address_id,
        };

        let query = format!(
            "INSERT INTO orders (id, user_id, address_id, payment_intent_id, total_cents, currency, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            ORDER_COLUMNS
        );
        let created = sqlx::query_as::<_, Order>(&query)
            .bind(order.id)
            .bind(order.user_id)
            .bind(address_id)
            .bind(&order.payment_intent_id)
            .bind(order.total_cents)
            .bind(&order.currency)
            .bind(&order.status)
            .bind(order.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_insert_error)?;

        for item in items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, model_id, size_id, quantity, unit_price_cents) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(item.id)
            .bind(created.id)
            .bind(item.model_id)
            .bind(item.size_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, AppError> {
        let query = format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, Order>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_for_user(&self, user_id: UserId, id: OrderId) -> Result<Option<Order>, AppError> {
        let query = format!(
            "SELECT {} FROM orders WHERE id = $1 AND user_id = $2",
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, AppError> {
        let query = format!(
            "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY id",
            ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, OrderItem>(&query)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn list_all(&self, limit: i64, offset: i64) -> Result<(Vec<Order>, i64), AppError> {
        let query = format!(
            "SELECT {} FROM orders ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, Order>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok((rows, total))
    }
}
