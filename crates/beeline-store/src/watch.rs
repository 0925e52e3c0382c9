//! Collection change notifications.
//!
//! The store pushes no data itself; it only announces that a slice of a
//! collection changed. Live queries react by re-running their full query and
//! replacing the previous snapshot wholesale, which is exactly the push
//! model the rest of the app is built around.

use tokio::sync::broadcast;

/// Buffered events per subscriber. A lagged subscriber only ever skips
/// intermediate snapshots; it resynchronizes by re-running its query.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// The named collections of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Contacts,
    ContactRequests,
    Messages,
    Invites,
    Notifications,
}

/// A committed write against one collection.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: Collection,
    /// Which slice changed: a chat id for `Messages`, a user id for the
    /// per-user collections. `None` means the whole collection.
    pub scope: Option<String>,
}

impl ChangeEvent {
    /// Whether this event is relevant for a subscription filtered to
    /// `collection` and (optionally) `scope`.
    pub fn matches(&self, collection: Collection, scope: Option<&str>) -> bool {
        if self.collection != collection {
            return false;
        }
        match (scope, self.scope.as_deref()) {
            (None, _) | (_, None) => true,
            (Some(want), Some(got)) => want == got,
        }
    }
}

/// Broadcast fan-out of [`ChangeEvent`]s to every open subscription.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Announce a committed write. A send error only means nobody is
    /// listening, which is fine.
    pub fn publish(&self, collection: Collection, scope: Option<String>) {
        let _ = self.tx.send(ChangeEvent { collection, scope });
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
