use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = stable UUID assigned at registration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic identifier for a two-party conversation.
///
/// Derived by sorting both participant ids lexicographically and joining
/// them with `_`, so `ChatId::for_pair(x, y) == ChatId::for_pair(y, x)`
/// without any coordination. One id per unordered pair hard-codes the
/// 1:1 chat model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChatId(String);

impl ChatId {
    pub fn for_pair(a: UserId, b: UserId) -> Self {
        let (a, b) = (a.to_string(), b.to_string());
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{lo}_{hi}"))
    }

    /// Wrap an id previously produced by [`ChatId::for_pair`] (e.g. read
    /// back from storage). No re-validation is performed.
    pub fn from_raw(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two participants, in sorted order.
    pub fn participants(&self) -> Option<(UserId, UserId)> {
        let (lo, hi) = self.0.split_once('_')?;
        Some((UserId::parse(lo).ok()?, UserId::parse(hi).ok()?))
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
