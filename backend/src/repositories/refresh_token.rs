//! Refresh-token ledger persistence.
//!
//! Rows are never deleted: consumption flips `is_used`, logout and password
//! changes flip `is_revoked`.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::refresh_token::RefreshToken;
use crate::types::{RefreshTokenId, UserId};
use crate::utils::jwt::hash_refresh_token;

const SELECT_COLUMNS: &str =
    "id, user_id, token_hash, jwt_id, is_used, is_revoked, created_at, expired_at";

/// Storage seam for the refresh-token ledger.
///
/// Use `MockRefreshTokenStore` in unit tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persists a freshly issued ledger row.
    async fn insert(&self, token: &RefreshToken) -> Result<(), AppError>;

    /// Looks a row up by the clear token the client presented.
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;

    /// Flips `is_used` if the row is still unused and unrevoked.
    ///
    /// Returns `false` when another request consumed or revoked it first.
    async fn mark_used(&self, id: RefreshTokenId) -> Result<bool, AppError>;

    /// Revokes every live row of a user, returning how many were revoked.
    async fn revoke_all_for_user(&self, user_id: UserId) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, token: &RefreshToken) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO refresh_tokens \
             (id, user_id, token_hash, jwt_id, is_used, is_revoked, created_at, expired_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(&token.jwt_id)
        .bind(token.is_used)
        .bind(token.is_revoked)
        .bind(token.created_at)
        .bind(token.expired_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let query = format!(
            "SELECT {} FROM refresh_tokens WHERE token_hash = $1",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, RefreshToken>(&query)
            .bind(hash_refresh_token(token))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn mark_used(&self, id: RefreshTokenId) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_used = TRUE \
             WHERE id = $1 AND is_used = FALSE AND is_revoked = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_revoked = TRUE \
             WHERE user_id = $1 AND is_revoked = FALSE AND is_used = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
