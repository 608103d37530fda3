//! Models for password reset functionality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::{PasswordResetId, UserId};
use crate::utils::security::sha256_hex;
use crate::validation::rules;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
/// Database representation of an e-mailed password reset code.
pub struct PasswordReset {
    pub id: PasswordResetId,
    pub user_id: UserId,
    /// SHA-256 hash of the code.
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Timestamp when this code was consumed or invalidated (null if still open).
    pub used_at: Option<DateTime<Utc>>,
    /// Wrong guesses made against this code.
    pub failed_attempts: i32,
}

impl PasswordReset {
    pub fn matches_code(&self, code: &str) -> bool {
        self.code_hash == sha256_hex(code)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for requesting a password reset.
pub struct RequestPasswordResetPayload {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for resetting a password with an e-mailed code.
pub struct ResetPasswordPayload {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(equal = 6, message = "Invalid reset code"))]
    pub code: String,
    #[validate(custom(function = "rules::validate_password_strength"))]
    pub new_password: String,
}
