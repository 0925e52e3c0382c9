//! The central application handle.
//!
//! [`Client`] owns the store handle, the auth provider, and the event bus,
//! and every operation module hangs its methods off it. The pieces are
//! constructed explicitly and passed in, never reached through globals.

use std::sync::{Arc, Mutex, MutexGuard};

use beeline_store::Database;

use crate::auth::AuthProvider;
use crate::error::ClientError;
use crate::events::EventBus;
use crate::Result;

/// Application logic entry point.
#[derive(Clone)]
pub struct Client {
    db: Arc<Mutex<Database>>,
    auth: AuthProvider,
    events: EventBus,
}

impl Client {
    pub fn new(db: Arc<Mutex<Database>>, auth: AuthProvider, events: EventBus) -> Self {
        Self { db, auth, events }
    }

    pub fn auth(&self) -> &AuthProvider {
        &self.auth
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The shared store handle (used by the subscription spawners).
    pub(crate) fn db_handle(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Lock the store for a short, non-await-crossing critical section.
    pub(crate) fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| ClientError::LockPoisoned)
    }
}
