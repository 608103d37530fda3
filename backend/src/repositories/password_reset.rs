use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::password_reset::PasswordReset;
use crate::types::{PasswordResetId, UserId};
use crate::utils::security::sha256_hex;

const SELECT_COLUMNS: &str =
    "id, user_id, code_hash, expires_at, created_at, used_at, failed_attempts";

/// Wrong guesses after which a reset code stops working.
pub const MAX_RESET_ATTEMPTS: i32 = 5;

/// Stores a new code for `user_id`, invalidating any code still open.
pub async fn create_password_reset(
    pool: &PgPool,
    user_id: UserId,
    code: &str,
    expires_at: DateTime<Utc>,
) -> Result<PasswordReset, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE password_resets SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let query = format!(
        "INSERT INTO password_resets (id, user_id, code_hash, expires_at) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        SELECT_COLUMNS
    );
    let record = sqlx::query_as::<_, PasswordReset>(&query)
        .bind(PasswordResetId::new())
        .bind(user_id)
        .bind(sha256_hex(code))
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(record)
}

/// The open code of `user_id`: unused, unexpired and not locked by wrong guesses.
pub async fn find_active_reset(
    pool: &PgPool,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<Option<PasswordReset>, AppError> {
    let query = format!(
        "SELECT {} FROM password_resets \
         WHERE user_id = $1 AND used_at IS NULL AND expires_at > $2 AND failed_attempts < $3 \
         ORDER BY created_at DESC LIMIT 1",
        SELECT_COLUMNS
    );
    let record = sqlx::query_as::<_, PasswordReset>(&query)
        .bind(user_id)
        .bind(now)
        .bind(MAX_RESET_ATTEMPTS)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// Counts a wrong guess. The code is closed once it reaches
/// `MAX_RESET_ATTEMPTS`. Returns the new count.
pub async fn record_failed_attempt(
    pool: &PgPool,
    reset_id: PasswordResetId,
) -> Result<i32, AppError> {
    let attempts = sqlx::query_scalar::<_, i32>(
        "UPDATE password_resets \
         SET failed_attempts = failed_attempts + 1, \
             used_at = CASE WHEN failed_attempts + 1 >= $2 THEN NOW() ELSE used_at END \
         WHERE id = $1 \
         RETURNING failed_attempts",
    )
    .bind(reset_id)
    .bind(MAX_RESET_ATTEMPTS)
    .fetch_one(pool)
    .await?;

    Ok(attempts)
}

/// Consumes a reset code. Returns `false` if it was already used or locked.
pub async fn mark_reset_as_used(pool: &PgPool, reset_id: PasswordResetId) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE password_resets SET used_at = NOW() \
         WHERE id = $1 AND used_at IS NULL AND failed_attempts < $2",
    )
    .bind(reset_id)
    .bind(MAX_RESET_ATTEMPTS)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
