//! Models that represent users, authentication payloads, and role metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::UserId;
use crate::validation::rules;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
/// Database representation of a customer or administrator account.
pub struct User {
    /// Unique identifier for the user.
    pub id: UserId,
    /// Unique handle chosen at registration.
    pub username: String,
    /// Unique e-mail address used for login and password resets.
    pub email: String,
    /// Argon2 hash of the user's password.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Human-readable full name.
    pub full_name: String,
    /// Role describing the user's privileges.
    pub role: UserRole,
    /// Creation timestamp for auditing.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp for auditing.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
/// Supported user roles stored in the database.
pub enum UserRole {
    /// Shopper with access to their own addresses and orders.
    #[default]
    Customer,
    /// Back-office role allowed to see every order.
    Admin,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Admin => "admin",
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "customer" => Ok(UserRole::Customer),
            "admin" => Ok(UserRole::Admin),
            _ => Err(serde::de::Error::unknown_variant(&s, &["customer", "admin"])),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
/// Payload for self-service account registration.
pub struct RegisterRequest {
    #[validate(custom(function = "rules::validate_username"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(custom(function = "rules::validate_password_strength"))]
    pub password: String,
    #[serde(default)]
    #[validate(length(max = 120))]
    pub full_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Credentials submitted by a user attempting to authenticate.
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Expired access token plus the refresh token that was issued alongside it.
pub struct RefreshRequest {
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Payload submitted when a user requests to change their password.
pub struct ChangePasswordRequest {
    /// Existing password that will be verified before applying the change.
    pub current_password: String,
    /// Replacement password that will be stored if verification succeeds.
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
/// Uniform outcome of every token-issuing endpoint.
///
/// Failures carry `success = false` and a list of human-readable errors
/// instead of surfacing as bare status codes.
pub struct AuthResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl AuthResult {
    pub fn issued(token: String, refresh_token: String) -> Self {
        Self {
            success: true,
            token: Some(token),
            refresh_token: Some(refresh_token),
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            success: false,
            token: None,
            refresh_token: None,
            errors,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
/// Public-facing representation of a user returned by the API.
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role.as_str().to_string(),
        }
    }
}

impl User {
    /// Constructs a new user with freshly generated identifiers.
    pub fn new(
        username: String,
        email: String,
        password_hash: String,
        full_name: String,
        role: UserRole,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            username,
            email,
            password_hash,
            full_name,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` when the user holds the `Admin` role.
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}
