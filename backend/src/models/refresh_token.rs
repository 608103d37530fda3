//! Refresh-token ledger rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::types::{RefreshTokenId, UserId};

#[derive(Debug, Clone, Serialize, FromRow)]
/// One issued refresh token and its consumption state.
///
/// The clear token is only ever returned to the client; the ledger keeps its
/// SHA-256 digest.
pub struct RefreshToken {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    #[serde(skip_serializing)]
    pub token_hash: String,
    /// `jti` of the access token minted in the same issuance.
    pub jwt_id: String,
    pub is_used: bool,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

impl RefreshToken {
    /// A token is live while it is unused, unrevoked and unexpired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_revoked && self.expired_at > now
    }
}
