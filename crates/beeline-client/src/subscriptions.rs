//! Live-query subscriptions.
//!
//! A [`LiveQuery`] is a standing, filtered query against the store: on
//! every relevant [`ChangeEvent`](beeline_store::ChangeEvent) it re-runs
//! the full query and pushes the whole result set through a watch channel.
//! Consumers replace their state wholesale on each push; nothing is
//! diffed. Dropping the handle tears the subscription down.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use beeline_shared::{ChatId, UserId};
use beeline_store::{Collection, Database, Message, Notification, StoreError};

use crate::client::Client;
use crate::contacts::{contact_views, request_views, ContactView, RequestView};
use crate::error::ClientError;
use crate::Result;

/// A standing subscription yielding full result-set snapshots.
pub struct LiveQuery<T> {
    rx: watch::Receiver<Vec<T>>,
    task: JoinHandle<()>,
}

impl<T: Clone> LiveQuery<T> {
    /// The most recent snapshot.
    pub fn snapshot(&self) -> Vec<T> {
        self.rx.borrow().clone()
    }

    /// Wait for the next push. Returns `false` once the subscription has
    /// shut down and no further snapshots will arrive.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        // Unsubscribe on teardown.
        self.task.abort();
    }
}

/// Spawn the refresh loop behind a [`LiveQuery`].
fn spawn_live_query<T, F>(
    db: Arc<Mutex<Database>>,
    collection: Collection,
    scope: Option<String>,
    query: F,
) -> Result<LiveQuery<T>>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Database) -> std::result::Result<Vec<T>, StoreError> + Send + 'static,
{
    let (bus_rx, initial) = {
        let guard = db.lock().map_err(|_| ClientError::LockPoisoned)?;
        (guard.bus().subscribe(), query(&guard)?)
    };

    let (tx, rx) = watch::channel(initial);
    let task = tokio::spawn(async move {
        let mut bus_rx = bus_rx;
        loop {
            let relevant = match bus_rx.recv().await {
                Ok(event) => event.matches(collection, scope.as_deref()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Skipped events only ever meant skipped intermediate
                    // snapshots; one fresh re-query catches us up.
                    tracing::debug!(skipped, "live query lagged, resynchronizing");
                    true
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if !relevant {
                continue;
            }

            let snapshot = {
                let Ok(guard) = db.lock() else {
                    tracing::error!("store lock poisoned, live query stopping");
                    break;
                };
                query(&guard)
            };

            match snapshot {
                Ok(rows) => {
                    if tx.send(rows).is_err() {
                        // Subscriber dropped; nothing left to push to.
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "live query refresh failed");
                }
            }
        }
    });

    Ok(LiveQuery { rx, task })
}

impl Client {
    /// Subscribe to the caller's contact list (joined and de-duplicated,
    /// like [`Client::list_contacts`]).
    pub async fn watch_contacts(&self, session: &str) -> Result<LiveQuery<ContactView>> {
        let me = self.auth().resolve(session).await?;
        let uid = me.uid;
        spawn_live_query(
            self.db_handle(),
            Collection::Contacts,
            Some(uid.to_string()),
            move |db| contact_views(db, uid),
        )
    }

    /// Subscribe to the caller's incoming pending requests.
    pub async fn watch_incoming_requests(&self, session: &str) -> Result<LiveQuery<RequestView>> {
        let me = self.auth().resolve(session).await?;
        let uid = me.uid;
        spawn_live_query(
            self.db_handle(),
            Collection::ContactRequests,
            Some(uid.to_string()),
            move |db| request_views(db, uid),
        )
    }

    /// Subscribe to the message stream of the chat with `peer`, ordered by
    /// creation time ascending.
    pub async fn watch_messages(&self, session: &str, peer: UserId) -> Result<LiveQuery<Message>> {
        let me = self.auth().resolve(session).await?;
        let chat_id = ChatId::for_pair(me.uid, peer);
        let scope = chat_id.as_str().to_string();
        spawn_live_query(
            self.db_handle(),
            Collection::Messages,
            Some(scope),
            move |db| db.messages_for_chat(&chat_id),
        )
    }

    /// Subscribe to the caller's unread notifications.
    pub async fn watch_notifications(&self, session: &str) -> Result<LiveQuery<Notification>> {
        let me = self.auth().resolve(session).await?;
        let uid = me.uid;
        spawn_live_query(
            self.db_handle(),
            Collection::Notifications,
            Some(uid.to_string()),
            move |db| db.notifications_for_user(uid, true),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::auth::{AuthProvider, DEFAULT_SESSION_TTL_SECS};
    use crate::events::EventBus;

    fn test_client() -> Client {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let auth = AuthProvider::new(Arc::clone(&db), DEFAULT_SESSION_TTL_SECS, true);
        Client::new(db, auth, EventBus::new())
    }

    async fn sign_up(client: &Client, name: &str) -> String {
        client
            .auth()
            .register(&format!("{name}@example.com"), "hunter22", name)
            .await
            .unwrap()
            .1
    }

    #[tokio::test]
    async fn message_subscription_pushes_new_snapshots() {
        let client = test_client();
        let alice_token = sign_up(&client, "alice").await;
        let bob_token = sign_up(&client, "bob").await;

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
        client
            .respond_request(&bob_token, request.id, true)
            .await
            .unwrap();

        let alice = client.auth().resolve(&alice_token).await.unwrap();
        let bob = client.auth().resolve(&bob_token).await.unwrap();
        let mut live = client.watch_messages(&alice_token, bob.uid).await.unwrap();
        assert!(live.snapshot().is_empty());

        client
            .send_message(&bob_token, alice.uid, "buzz")
            .await
            .unwrap();

        assert!(live.changed().await);
        let snapshot = live.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].text, "buzz");
    }

    #[tokio::test]
    async fn contact_subscription_sees_accepted_request() {
        let client = test_client();
        let alice_token = sign_up(&client, "alice").await;
        let bob_token = sign_up(&client, "bob").await;

        let mut live = client.watch_contacts(&alice_token).await.unwrap();
        assert!(live.snapshot().is_empty());

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
        client
            .respond_request(&bob_token, request.id, true)
            .await
            .unwrap();

        assert!(live.changed().await);
        assert_eq!(live.snapshot().len(), 1);
        assert_eq!(live.snapshot()[0].display_name, "bob");
    }

    #[tokio::test]
    async fn dropped_subscription_stops_its_task() {
        let client = test_client();
        let alice_token = sign_up(&client, "alice").await;

        let live = client.watch_contacts(&alice_token).await.unwrap();
        let rx = live.rx.clone();
        drop(live);

        // The refresh task is aborted on drop; the watch sender goes away
        // with it, which closes the receiver side.
        let mut rx = rx;
        assert!(rx.changed().await.is_err());
    }
}
