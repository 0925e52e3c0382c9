//! # beeline-client
//!
//! Application logic for the Beeline direct-messaging app: the auth/session
//! provider, the contact-request lifecycle, the two-party chat room, the
//! invite flow, notifications, and live-query subscriptions over the store's
//! change bus.
//!
//! Everything hangs off an explicitly constructed [`Client`] (and its
//! [`auth::AuthProvider`]); there is no global store or auth singleton.

pub mod auth;
pub mod chat;
pub mod client;
pub mod contacts;
pub mod events;
pub mod invites;
pub mod notifications;
pub mod subscriptions;

mod error;

pub use auth::{AuthProvider, AuthUser};
pub use client::Client;
pub use error::ClientError;
pub use events::EventBus;
pub use subscriptions::LiveQuery;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
