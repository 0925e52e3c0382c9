//! # beeline-store
//!
//! The document store behind the Beeline messaging app, backed by SQLite.
//!
//! Data is organized as named collections (`users`, `contacts`,
//! `contact_requests`, `messages`, `invites`, `notifications`) with typed
//! CRUD helpers on a single [`Database`] handle. Every committed write
//! publishes a [`watch::ChangeEvent`] on the database's [`watch::ChangeBus`],
//! which is what live-query subscriptions listen to.

pub mod accounts;
pub mod contacts;
pub mod database;
pub mod invites;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod requests;
pub mod users;
pub mod watch;

mod error;
mod row;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use watch::{ChangeBus, ChangeEvent, Collection};
