use std::sync::OnceLock;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;

    Ok(password_hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("Invalid password hash: {}", e))?;

    let argon2 = Argon2::default();
    let result = argon2.verify_password(password.as_bytes(), &parsed_hash);

    match result {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification error: {}", e)),
    }
}

/// Verifies against `hash` when an account was found, otherwise burns the same
/// argon2 work on a throwaway hash so unknown e-mails are not distinguishable
/// by response time. Returns `false` whenever `hash` is `None`.
pub fn verify_password_or_dummy(password: &str, hash: Option<&str>) -> anyhow::Result<bool> {
    static DUMMY_HASH: OnceLock<String> = OnceLock::new();

    match hash {
        Some(hash) => verify_password(password, hash),
        None => {
            let dummy = match DUMMY_HASH.get() {
                Some(existing) => existing,
                None => {
                    let generated = hash_password("storefront-dummy-password")?;
                    DUMMY_HASH.get_or_init(|| generated)
                }
            };
            verify_password(password, dummy)?;
            Ok(false)
        }
    }
}
