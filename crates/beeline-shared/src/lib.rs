//! # beeline-shared
//!
//! Identifiers, chat-channel addressing, invite tokens, and input validation
//! shared by every Beeline crate.

pub mod invite;
pub mod types;
pub mod validate;

pub use invite::{InviteToken, InviteTokenError, INVITE_TTL_HOURS};
pub use types::{ChatId, UserId};
