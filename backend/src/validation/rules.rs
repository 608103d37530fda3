//! Common validation rules shared across request payloads.

use validator::ValidationError;

pub const PASSWORD_MIN_LENGTH: usize = 8;
const PASSWORD_MAX_LENGTH: usize = 128;

/// Validates username format.
///
/// Requirements:
/// - Only alphanumeric characters and underscores
/// - 1-50 characters in length
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() || username.len() > 50 {
        return Err(ValidationError::new("username_invalid_length"));
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ValidationError::new("username_invalid_characters"));
    }

    Ok(())
}

/// Validates password length bounds.
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();
    if length < PASSWORD_MIN_LENGTH {
        return Err(ValidationError::new("password_too_short"));
    }
    if length > PASSWORD_MAX_LENGTH {
        return Err(ValidationError::new("password_too_long"));
    }
    Ok(())
}
