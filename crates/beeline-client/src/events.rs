//! Application events pushed to connected UIs.
//!
//! Operations emit named events addressed to a user; the server's SSE
//! endpoint forwards each user their own stream. Payloads are small
//! snapshots, not authoritative data -- consumers re-query through the
//! normal read paths.

use serde::Serialize;
use tokio::sync::broadcast;

use beeline_shared::UserId;

pub const EVENT_NEW_MESSAGE: &str = "new-message";
pub const EVENT_CONTACT_REQUEST: &str = "contact-request";
pub const EVENT_REQUEST_RESPONDED: &str = "request-responded";
pub const EVENT_CONTACTS_CHANGED: &str = "contacts-changed";
pub const EVENT_NOTIFICATION: &str = "notification";

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct NewMessagePayload {
    pub chat_id: String,
    pub sender: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactRequestPayload {
    pub request_id: String,
    pub from: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestRespondedPayload {
    pub request_id: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub id: String,
    pub kind: String,
    pub actor_name: String,
}

/// An event addressed to one user.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub event: &'static str,
    #[serde(skip)]
    pub user_id: UserId,
    pub data: serde_json::Value,
}

/// Broadcast fan-out of [`EventEnvelope`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Emit an event for one user. A send error only means nobody is
    /// connected; a serialization error is a bug worth logging.
    pub fn emit<S: Serialize>(&self, event: &'static str, user_id: UserId, payload: S) {
        match serde_json::to_value(payload) {
            Ok(data) => {
                let _ = self.tx.send(EventEnvelope {
                    event,
                    user_id,
                    data,
                });
            }
            Err(e) => {
                tracing::error!(event, error = %e, "failed to serialize event payload");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
