use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// How long an invite link stays redeemable.
pub const INVITE_TTL_HOURS: i64 = 24;

const TOKEN_BYTES: usize = 16;
// 16 random bytes -> 22 chars of url-safe base64, no padding.
const TOKEN_LEN: usize = 22;

/// An opaque, random invite token.
///
/// The token is the `{token}` segment of a shareable `/invite/{token}` link
/// and the primary key of the corresponding invite document. It grants the
/// bearer the ability to establish a contact/chat with its creator until
/// the invite expires or is redeemed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct InviteToken(String);

impl InviteToken {
    /// Generate a fresh 128-bit random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(base64_url_encode(&bytes))
    }

    /// Parse a token received from a link or request path.
    ///
    /// Only the shape is checked here; whether the token actually exists
    /// is a store lookup.
    pub fn parse(s: &str) -> Result<Self, InviteTokenError> {
        let s = s.trim();
        if s.len() != TOKEN_LEN || !s.bytes().all(is_base64_url_char) {
            return Err(InviteTokenError::InvalidFormat);
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expiry timestamp for an invite created at `created_at`.
    pub fn expires_at(created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + Duration::hours(INVITE_TTL_HOURS)
    }
}

impl std::fmt::Display for InviteToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InviteTokenError {
    #[error("Invalid invite token format")]
    InvalidFormat,
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    URL_SAFE_NO_PAD.encode(data)
}

fn is_base64_url_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_parse_round_trip() {
        let token = InviteToken::generate();
        let parsed = InviteToken::parse(token.as_str()).expect("parse should work");
        assert_eq!(token, parsed);
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = InviteToken::generate();
        let b = InviteToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(InviteToken::parse("").is_err());
        assert!(InviteToken::parse("short").is_err());
        assert!(InviteToken::parse("has spaces has spaces h").is_err());
        // right length, wrong alphabet
        assert!(InviteToken::parse("!!!!!!!!!!!!!!!!!!!!!!").is_err());
    }

    #[test]
    fn test_expiry_is_24h() {
        let created = Utc::now();
        let expires = InviteToken::expires_at(created);
        assert_eq!(expires - created, Duration::hours(24));
    }
}
