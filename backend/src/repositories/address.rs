//! Address repository.
//!
//! Every query is scoped by owner so one user can never read or modify
//! another user's address.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::address::Address;
use crate::types::{AddressId, UserId};

const TABLE_NAME: &str = "addresses";
const SELECT_COLUMNS: &str =
    "id, user_id, name, street, city, postal_code, country, phone, created_at, updated_at";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressRepository: Send + Sync {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Address>, AppError>;

    async fn find_for_user(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<Option<Address>, AppError>;

    async fn find_by_name(&self, user_id: UserId, name: &str) -> Result<Option<Address>, AppError>;

    async fn create(&self, address: &Address) -> Result<Address, AppError>;

    async fn update(&self, address: &Address) -> Result<Address, AppError>;

    /// Returns `false` when nothing owned by `user_id` had that id.
    async fn delete(&self, user_id: UserId, id: AddressId) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct PgAddressRepository {
    pool: PgPool,
}

impl PgAddressRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn base_select_query() -> String {
        format!("SELECT {} FROM {}", SELECT_COLUMNS, TABLE_NAME)
    }
}

#[async_trait]
impl AddressRepository for PgAddressRepository {
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Address>, AppError> {
        let query = format!(
            "{} WHERE user_id = $1 ORDER BY created_at ASC",
            Self::base_select_query()
        );
        let rows = sqlx::query_as::<_, Address>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn find_for_user(
        &self,
        user_id: UserId,
        id: AddressId,
    ) -> Result<Option<Address>, AppError> {
        let query = format!("{} WHERE id = $1 AND user_id = $2", Self::base_select_query());
        let row = sqlx::query_as::<_, Address>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_name(&self, user_id: UserId, name: &str) -> Result<Option<Address>, AppError> {
        let query = format!("{} WHERE user_id = $1 AND name = $2", Self::base_select_query());
        let row = sqlx::query_as::<_, Address>(&query)
            .bind(user_id)
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create(&self, address: &Address) -> Result<Address, AppError> {
        let query = format!(
            "INSERT INTO {} (id, user_id, name, street, city, postal_code, country, phone, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, Address>(&query)
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
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update(&self, address: &Address) -> Result<Address, AppError> {
        let query = format!(
            "UPDATE {} SET name = $3, street = $4, city = $5, postal_code = $6, country = $7, \
             phone = $8, updated_at = $9 WHERE id = $1 AND user_id = $2 RETURNING {}",
            TABLE_NAME, SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, Address>(&query)
            .bind(address.id)
            .bind(address.user_id)
            .bind(&address.name)
            .bind(&address.street)
            .bind(&address.city)
            .bind(&address.postal_code)
            .bind(&address.country)
            .bind(&address.phone)
            .bind(address.updated_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Address not found".into()))?;
        Ok(row)
    }

    async fn delete(&self, user_id: UserId, id: AddressId) -> Result<bool, AppError> {
        let query = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", TABLE_NAME);
        let result = sqlx::query(&query)
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
