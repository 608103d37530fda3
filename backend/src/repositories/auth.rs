use sqlx::PgPool;

use crate::models::user::User;
use crate::types::UserId;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, LOWER(role) AS role, created_at, updated_at";

/// Finds a user by their e-mail address (case-insensitive).
pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {} FROM users WHERE LOWER(email) = LOWER($1)", USER_COLUMNS);
    sqlx::query_as::<_, User>(&query)
        .bind(email.trim())
        .fetch_optional(pool)
        .await
}

/// Finds a user by their ID.
pub async fn find_user_by_id(pool: &PgPool, user_id: UserId) -> Result<Option<User>, sqlx::Error> {
    let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    sqlx::query_as::<_, User>(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Returns `true` when either the username or the e-mail is already registered.
pub async fn username_or_email_taken(
    pool: &PgPool,
    username: &str,
    email: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1 OR LOWER(email) = LOWER($2))",
    )
    .bind(username)
    .bind(email.trim())
    .fetch_one(pool)
    .await
}

/// Inserts a new user row.
pub async fn insert_user(pool: &PgPool, user: &User) -> Result<User, sqlx::Error> {
    let query = format!(
        "INSERT INTO users (id, username, email, password_hash, full_name, role, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
        USER_COLUMNS
    );
    sqlx::query_as::<_, User>(&query)
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .fetch_one(pool)
        .await
}

/// Updates a user's password hash.
pub async fn update_user_password(
    pool: &PgPool,
    user_id: UserId,
    new_password_hash: &str,
) -> Result<User, sqlx::Error> {
    let query = format!(
        "UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2 RETURNING {}",
        USER_COLUMNS
    );
    sqlx::query_as::<_, User>(&query)
        .bind(new_password_hash)
        .bind(user_id)
        .fetch_one(pool)
        .await
}
