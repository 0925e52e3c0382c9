//! Domain model structs persisted in the document store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use beeline_shared::{ChatId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user's public profile document, created on first sign-up and never
/// deleted by the app.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Stable identity key.
    pub uid: UserId,
    /// Sign-in email, unique across users.
    pub email: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Unique lowercase handle, `None` until claimed after registration.
    pub username: Option<String>,
    /// Optional avatar URL.
    pub photo_url: Option<String>,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Auth account
// ---------------------------------------------------------------------------

/// The identity provider's own record for a user. Never exposed through
/// the API; the password hash stays inside the auth layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthAccount {
    /// Matches `users.uid`.
    pub uid: UserId,
    pub email: String,
    /// Argon2id hash in PHC string format.
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Contact request
// ---------------------------------------------------------------------------

/// Contact request lifecycle state: `pending` until the recipient responds,
/// then a terminal `accepted` or `rejected`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A pending-or-answered friend request from `from_uid` to `to_uid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactRequest {
    pub id: Uuid,
    pub from_uid: UserId,
    pub to_uid: UserId,
    /// Sorted uid pair; the same derivation as a chat id. A partial unique
    /// index over this column keeps at most one live request per pair.
    pub pair_key: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContactRequest {
    /// Build a fresh pending request between two users.
    pub fn pending(from_uid: UserId, to_uid: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_uid,
            to_uid,
            pair_key: ChatId::for_pair(from_uid, to_uid).as_str().to_string(),
            status: RequestStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// One directional contact edge `user_id -> contact_id`.
///
/// A mutual friendship is exactly two such rows, one per direction, always
/// written in the same transaction. Display fields are a denormalized
/// snapshot taken at creation time; readers join against `users` for fresh
/// values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub id: Uuid,
    /// Owner of this edge.
    pub user_id: UserId,
    /// The other party.
    pub contact_id: UserId,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub chat_id: ChatId,
    /// When the two last exchanged a message, if ever.
    pub last_chat_at: Option<DateTime<Utc>>,
    /// Preview of the most recent message.
    pub last_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Build one half of a mutual contact pair, owned by `owner` and
    /// pointing at `other`.
    pub fn edge(owner: UserId, other: &User, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: owner,
            contact_id: other.uid,
            display_name: other.display_name.clone(),
            photo_url: other.photo_url.clone(),
            chat_id: ChatId::for_pair(owner, other.uid),
            last_chat_at: None,
            last_message: None,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Delivery state of a message. `Sent` on append; flipped to `Read` when
/// the recipient opens the chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

/// A single chat message. Immutable once created, except for the status
/// flip; ordering within a chat is `created_at` ascending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub chat_id: ChatId,
    pub sender_uid: UserId,
    pub recipient_uid: UserId,
    pub text: String,
    pub status: MessageStatus,
    /// Assigned by the store at append time.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Invite
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            _ => None,
        }
    }
}

/// A shareable, time-bounded invite. The row id is the bearer token from
/// the `/invite/{token}` link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Invite {
    /// The token itself.
    pub id: String,
    pub created_by: UserId,
    /// Creator snapshot for display on the redemption page.
    pub creator_name: String,
    pub creator_photo: Option<String>,
    pub status: InviteStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub accepted_by: Option<UserId>,
}

impl Invite {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    /// Someone sent you a contact request.
    NewRequest,
    /// Someone accepted your contact request.
    RequestAccepted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRequest => "new-request",
            Self::RequestAccepted => "request-accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new-request" => Some(Self::NewRequest),
            "request-accepted" => Some(Self::RequestAccepted),
            _ => None,
        }
    }
}

/// An in-app notification, marked read by its recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient.
    pub user_id: UserId,
    pub kind: NotificationKind,
    /// Who triggered the notification.
    pub actor_uid: UserId,
    pub actor_name: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: UserId,
        kind: NotificationKind,
        actor_uid: UserId,
        actor_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            actor_uid,
            actor_name,
            is_read: false,
            created_at: now,
        }
    }
}
