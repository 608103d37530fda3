use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UserId;
use crate::utils::security::sha256_hex;

/// The only signing scheme the server issues or accepts.
pub const ACCESS_TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

const REFRESH_TOKEN_BYTES: usize = 48;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    pub email: String,
    pub role: String,
    pub exp: i64,    // expiration time
    pub iat: i64,    // issued at
    pub jti: String, // JWT ID
}

impl Claims {
    pub fn new(
        user_id: UserId,
        username: String,
        email: String,
        role: String,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            sub: user_id.to_string(),
            username,
            email,
            role,
            exp: (issued_at + lifetime).timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok()
    }
}

pub fn encode_access_token(claims: &Claims, secret: &str) -> anyhow::Result<String> {
    let token = encode(
        &Header::new(ACCESS_TOKEN_ALGORITHM),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

/// Fully validates an access token: signature, algorithm and expiry.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(ACCESS_TOKEN_ALGORITHM);
    validation.leeway = 0;
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}

/// Validates signature and structure only. Expiry is left to the caller.
pub fn decode_access_token_ignoring_expiry(
    token: &str,
    secret: &str,
) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(ACCESS_TOKEN_ALGORITHM);
    validation.validate_exp = false;
    validation.leeway = 0;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
}

/// Opaque, URL-safe refresh token handed to the client.
pub fn generate_refresh_token() -> String {
    let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest stored in the ledger in place of the clear refresh token.
pub fn hash_refresh_token(token: &str) -> String {
    sha256_hex(token)
}
