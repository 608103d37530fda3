//! Access/refresh token issuance and the refresh-token verifier.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;

use crate::config::Config;
use crate::error::AppError;
use crate::models::refresh_token::RefreshToken;
use crate::models::user::User;
use crate::repositories::RefreshTokenStore;
use crate::types::{RefreshTokenId, UserId};
use crate::utils::jwt::{
    decode_access_token_ignoring_expiry, encode_access_token, generate_refresh_token,
    hash_refresh_token, verify_access_token, Claims, ACCESS_TOKEN_ALGORITHM,
};

/// Reasons a refresh attempt is refused.
///
/// Display strings are returned to the client in `AuthResult::errors`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("Refresh token does not exist")]
    NotFound,
    #[error("Invalid access token")]
    Invalid,
    #[error("Refresh token does not match the access token")]
    Mismatch,
    #[error("Access token has not expired yet")]
    NotExpired,
    #[error("Unexpected token algorithm")]
    UnexpectedAlgorithm,
    #[error("Refresh token has already been used")]
    AlreadyUsed,
    #[error("Refresh token has been revoked")]
    Revoked,
    #[error("Refresh token has expired")]
    Expired,
    #[error("Unable to refresh tokens")]
    Internal,
}

impl RefreshError {
    fn internal(err: AppError) -> Self {
        tracing::error!(error = ?err, "refresh-token ledger failure");
        RefreshError::Internal
    }
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub access_token_lifetime: Duration,
    pub refresh_token_lifetime: Duration,
}

impl TokenSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_token_lifetime: Duration::minutes(config.access_token_expiration_minutes as i64),
            refresh_token_lifetime: Duration::days(config.refresh_token_expiration_days as i64),
        }
    }
}

/// Result of one issuance: the pair handed to the client plus what was stored.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub claims: Claims,
    pub record: RefreshToken,
}

pub struct TokenService {
    store: Arc<dyn RefreshTokenStore>,
    settings: TokenSettings,
}

impl TokenService {
    pub fn new(store: Arc<dyn RefreshTokenStore>, settings: TokenSettings) -> Self {
        Self { store, settings }
    }

    /// Validates a bearer access token for request authentication.
    pub fn authenticate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        verify_access_token(token, &self.settings.secret)
    }

    pub async fn issue(&self, user: &User) -> Result<IssuedTokens, AppError> {
        self.issue_at(user, Utc::now()).await
    }

    /// Mints an access token and a paired refresh token, recording the latter
    /// in the ledger under the access token's `jti`.
    pub async fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<IssuedTokens, AppError> {
        let claims = Claims::new(
            user.id,
            user.username.clone(),
            user.email.clone(),
            user.role.as_str().to_string(),
            now,
            self.settings.access_token_lifetime,
        );
        let access_token = encode_access_token(&claims, &self.settings.secret)?;

        let refresh_token = generate_refresh_token();
        let record = RefreshToken {
            id: RefreshTokenId::new(),
            user_id: user.id,
            token_hash: hash_refresh_token(&refresh_token),
            jwt_id: claims.jti.clone(),
            is_used: false,
            is_revoked: false,
            created_at: now,
            expired_at: now + self.settings.refresh_token_lifetime,
        };
        self.store.insert(&record).await?;

        tracing::debug!(user_id = %user.id, jti = %claims.jti, "issued token pair");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            claims,
            record,
        })
    }

    /// Checks that `refresh_token` may be exchanged for a new pair and
    /// consumes it. Returns the owner on success.
    ///
    /// Checks run in a fixed order and stop at the first failure; the token is
    /// only consumed once every check has passed.
    pub async fn verify_refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<UserId, RefreshError> {
        let record = self
            .store
            .find_by_token(refresh_token)
            .await
            .map_err(RefreshError::internal)?
            .ok_or(RefreshError::NotFound)?;

        let token_data = decode_access_token_ignoring_expiry(access_token, &self.settings.secret)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidAlgorithm => RefreshError::UnexpectedAlgorithm,
                _ => RefreshError::Invalid,
            })?;
        let claims = token_data.claims;

        if claims.jti != record.jwt_id || claims.user_id() != Some(record.user_id) {
            return Err(RefreshError::Mismatch);
        }

        if claims.exp > now.timestamp() {
            return Err(RefreshError::NotExpired);
        }

        if token_data.header.alg != ACCESS_TOKEN_ALGORITHM {
            return Err(RefreshError::UnexpectedAlgorithm);
        }

        if record.is_used {
            return Err(RefreshError::AlreadyUsed);
        }
        if record.is_revoked {
            return Err(RefreshError::Revoked);
        }
        if !record.is_live(now) {
            return Err(RefreshError::Expired);
        }

        let consumed = self
            .store
            .mark_used(record.id)
            .await
            .map_err(RefreshError::internal)?;
        if !consumed {
            tracing::warn!(user_id = %record.user_id, "refresh token consumed concurrently");
            return Err(RefreshError::AlreadyUsed);
        }

        Ok(record.user_id)
    }

    pub async fn revoke_all(&self, user_id: UserId) -> Result<u64, AppError> {
        let revoked = self.store.revoke_all_for_user(user_id).await?;
        tracing::debug!(%user_id, revoked, "revoked refresh tokens");
        Ok(revoked)
    }
}
