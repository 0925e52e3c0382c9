//! Input validation for user-supplied profile fields.

use thiserror::Error;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username must be {USERNAME_MIN}-{USERNAME_MAX} characters")]
    UsernameLength,

    #[error("Username may only contain letters, numbers, and underscores")]
    UsernameCharset,

    #[error("Invalid email address")]
    Email,

    #[error("Password must be at least {PASSWORD_MIN} characters")]
    Password,

    #[error("Message text must not be empty")]
    EmptyMessage,
}

const PASSWORD_MIN: usize = 6;

/// Reject passwords that are too short to bother hashing.
pub fn validate_password(raw: &str) -> Result<(), ValidationError> {
    if raw.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::Password);
    }
    Ok(())
}

/// Validate and canonicalize a username. Usernames are stored lowercase so
/// lookups are case-insensitive.
pub fn normalize_username(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if raw.len() < USERNAME_MIN || raw.len() > USERNAME_MAX {
        return Err(ValidationError::UsernameLength);
    }
    if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(ValidationError::UsernameCharset);
    }
    Ok(raw.to_lowercase())
}

/// Minimal shape check for an email address. Deliverability is not our
/// problem; this only rejects obviously malformed input before a store
/// lookup.
pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let raw = raw.trim();
    let Some((local, domain)) = raw.split_once('@') else {
        return Err(ValidationError::Email);
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || raw.contains(' ') {
        return Err(ValidationError::Email);
    }
    Ok(raw.to_lowercase())
}

/// Trim a message body and reject blank messages.
pub fn normalize_message_text(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_lowercased() {
        assert_eq!(normalize_username("BeeKeeper_7").unwrap(), "beekeeper_7");
    }

    #[test]
    fn username_length_bounds() {
        assert_eq!(
            normalize_username("ab"),
            Err(ValidationError::UsernameLength)
        );
        assert_eq!(
            normalize_username(&"a".repeat(21)),
            Err(ValidationError::UsernameLength)
        );
        assert!(normalize_username("abc").is_ok());
        assert!(normalize_username(&"a".repeat(20)).is_ok());
    }

    #[test]
    fn username_rejects_symbols() {
        assert_eq!(
            normalize_username("bee keeper"),
            Err(ValidationError::UsernameCharset)
        );
        assert_eq!(
            normalize_username("bee@hive"),
            Err(ValidationError::UsernameCharset)
        );
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("a@b.com").is_ok());
        assert_eq!(validate_email("A@B.Com").unwrap(), "a@b.com");
        assert!(validate_email("nope").is_err());
        assert!(validate_email("@b.com").is_err());
        assert!(validate_email("a@").is_err());
        assert!(validate_email("a@nodot").is_err());
    }

    #[test]
    fn password_minimum_length() {
        assert_eq!(validate_password("12345"), Err(ValidationError::Password));
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn message_text_trimmed() {
        assert_eq!(normalize_message_text("  hi  ").unwrap(), "hi");
        assert!(normalize_message_text("   ").is_err());
    }
}
