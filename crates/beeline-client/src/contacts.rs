//! Contact list and contact-request lifecycle.
//!
//! The request state machine is `none -> pending -> accepted | rejected`.
//! Accepting materializes both halves of the mutual contact pair in one
//! store transaction; rejecting flips the status and nothing else.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use beeline_shared::validate::validate_email;
use beeline_shared::{ChatId, UserId};
use beeline_store::{
    Contact, ContactRequest, Database, Notification, NotificationKind, RequestStatus, StoreError,
    User,
};

use crate::auth::AuthUser;
use crate::client::Client;
use crate::error::ClientError;
use crate::events::{
    ContactRequestPayload, NotificationPayload, RequestRespondedPayload, EVENT_CONTACTS_CHANGED,
    EVENT_CONTACT_REQUEST, EVENT_NOTIFICATION, EVENT_REQUEST_RESPONDED,
};
use crate::Result;

/// A contact edge joined against the live profile of the other party.
/// Fresh profile fields win over the denormalized snapshot on the edge.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContactView {
    pub id: String,
    pub contact_id: String,
    pub display_name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub chat_id: String,
    pub last_chat_at: Option<String>,
    pub last_message: Option<String>,
}

impl ContactView {
    fn joined(contact: &Contact, user: &User) -> Self {
        Self {
            id: contact.id.to_string(),
            contact_id: contact.contact_id.to_string(),
            display_name: user.display_name.clone(),
            username: user.username.clone(),
            photo_url: user.photo_url.clone(),
            chat_id: contact.chat_id.as_str().to_string(),
            last_chat_at: contact.last_chat_at.map(|t| t.to_rfc3339()),
            last_message: contact.last_message.clone(),
        }
    }
}

/// An incoming request joined with the sender's profile.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: String,
    pub from_uid: String,
    pub display_name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub created_at: String,
}

impl RequestView {
    fn joined(request: &ContactRequest, sender: &User) -> Self {
        Self {
            id: request.id.to_string(),
            from_uid: request.from_uid.to_string(),
            display_name: sender.display_name.clone(),
            username: sender.username.clone(),
            photo_url: sender.photo_url.clone(),
            created_at: request.created_at.to_rfc3339(),
        }
    }
}

/// An outgoing request with its current status, for the "request sent /
/// declined" badges next to contacts.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SentRequestView {
    pub id: String,
    pub to_uid: String,
    pub status: RequestStatus,
    pub created_at: String,
}

impl Client {
    // ------------------------------------------------------------------
    // Request lifecycle
    // ------------------------------------------------------------------

    /// Send a contact request to a user addressed by username or email.
    ///
    /// Nothing is written unless the target resolves, is not the caller,
    /// and no live request or contact already links the pair. The
    /// pre-checks only shape the error message; the store's unique
    /// constraints are what actually prevent duplicates under races.
    pub async fn send_request(&self, session: &str, target: &str) -> Result<ContactRequest> {
        let me = self.auth().resolve(session).await?;

        let request = {
            let db = self.db()?;
            let target_user = resolve_target(&db, target)?;

            if target_user.uid == me.uid {
                return Err(ClientError::SelfRequest);
            }

            let pair_key = ChatId::for_pair(me.uid, target_user.uid);
            if db.live_request_exists(pair_key.as_str())? {
                return Err(ClientError::RequestExists);
            }
            if db.find_contact_between(me.uid, target_user.uid)?.is_some() {
                return Err(ClientError::AlreadyContacts);
            }

            let request = ContactRequest::pending(me.uid, target_user.uid, Utc::now());
            db.insert_request(&request).map_err(|e| match e {
                StoreError::AlreadyExists => ClientError::RequestExists,
                other => ClientError::Store(other),
            })?;

            db.insert_notification(&Notification::new(
                target_user.uid,
                NotificationKind::NewRequest,
                me.uid,
                me.display_name.clone(),
                Utc::now(),
            ))?;

            request
        };

        info!(from = %me.uid, to = %request.to_uid, "contact request sent");

        self.events().emit(
            EVENT_CONTACT_REQUEST,
            request.to_uid,
            ContactRequestPayload {
                request_id: request.id.to_string(),
                from: me.uid.to_string(),
                display_name: me.display_name.clone(),
            },
        );
        Ok(request)
    }

    /// Answer a pending request addressed to the caller.
    ///
    /// Accepting flips the status and creates both contact edges in one
    /// transaction, then notifies the sender. Rejecting flips the status
    /// and creates nothing.
    pub async fn respond_request(&self, session: &str, request_id: Uuid, accept: bool) -> Result<()> {
        let me = self.auth().resolve(session).await?;
        let now = Utc::now();

        let request = {
            let db = self.db()?;
            db.get_request(request_id).map_err(|e| match e {
                StoreError::NotFound => ClientError::NotFound,
                other => ClientError::Store(other),
            })?
        };

        if request.to_uid != me.uid {
            return Err(ClientError::Forbidden);
        }
        if request.status != RequestStatus::Pending {
            return Err(ClientError::InvalidState);
        }

        if accept {
            let mut db = self.db()?;
            let sender = db.get_user(request.from_uid)?;
            let my_profile = db.get_user(me.uid)?;

            let my_edge = Contact::edge(me.uid, &sender, now);
            let sender_edge = Contact::edge(sender.uid, &my_profile, now);

            let flipped = db
                .accept_request(request.id, (&my_edge, &sender_edge), now)
                .map_err(|e| match e {
                    // One half of the pair already exists; the whole accept
                    // rolled back rather than leaving a lone edge.
                    StoreError::AlreadyExists => ClientError::AlreadyContacts,
                    other => ClientError::Store(other),
                })?;
            if !flipped {
                return Err(ClientError::InvalidState);
            }

            let notification = Notification::new(
                sender.uid,
                NotificationKind::RequestAccepted,
                me.uid,
                my_profile.display_name.clone(),
                now,
            );
            db.insert_notification(&notification)?;
            drop(db);

            info!(request = %request.id, by = %me.uid, "contact request accepted");

            self.events().emit(
                EVENT_NOTIFICATION,
                sender.uid,
                NotificationPayload {
                    id: notification.id.to_string(),
                    kind: notification.kind.as_str().to_string(),
                    actor_name: notification.actor_name.clone(),
                },
            );
            self.events()
                .emit(EVENT_CONTACTS_CHANGED, sender.uid, serde_json::json!({}));
            self.events()
                .emit(EVENT_CONTACTS_CHANGED, me.uid, serde_json::json!({}));
        } else {
            let flipped = {
                let db = self.db()?;
                db.reject_request(request.id, now)?
            };
            if !flipped {
                return Err(ClientError::InvalidState);
            }

            info!(request = %request.id, by = %me.uid, "contact request rejected");
        }

        self.events().emit(
            EVENT_REQUEST_RESPONDED,
            request.from_uid,
            RequestRespondedPayload {
                request_id: request.id.to_string(),
                accepted: accept,
            },
        );
        Ok(())
    }

    /// Remove one of the caller's own contact edges. The reverse edge is
    /// left in place; removal is one-sided.
    pub async fn remove_contact(&self, session: &str, contact_id: Uuid) -> Result<()> {
        let me = self.auth().resolve(session).await?;

        let deleted = {
            let db = self.db()?;
            db.delete_contact_for_user(me.uid, contact_id)?
        };
        if !deleted {
            return Err(ClientError::NotFound);
        }

        info!(user = %me.uid, contact = %contact_id, "contact removed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The caller's contact list, joined against live profiles,
    /// de-duplicated, most recently active first.
    pub async fn list_contacts(&self, session: &str) -> Result<Vec<ContactView>> {
        let me = self.auth().resolve(session).await?;
        let db = self.db()?;
        Ok(contact_views(&db, me.uid)?)
    }

    /// Incoming requests awaiting the caller's response.
    pub async fn pending_requests(&self, session: &str) -> Result<Vec<RequestView>> {
        let me = self.auth().resolve(session).await?;
        let db = self.db()?;
        Ok(request_views(&db, me.uid)?)
    }

    /// Every request the caller has sent, with current status.
    pub async fn sent_requests(&self, session: &str) -> Result<Vec<SentRequestView>> {
        let me = self.auth().resolve(session).await?;
        let db = self.db()?;
        let sent = db.requests_from(me.uid)?;
        Ok(sent
            .iter()
            .map(|r| SentRequestView {
                id: r.id.to_string(),
                to_uid: r.to_uid.to_string(),
                status: r.status,
                created_at: r.created_at.to_rfc3339(),
            })
            .collect())
    }

    /// Resolve a username or email to a profile (the add-contact lookup).
    pub async fn lookup_user(&self, session: &str, query: &str) -> Result<AuthUser> {
        self.auth().resolve(session).await?;
        let db = self.db()?;
        resolve_target(&db, query).map(AuthUser::from)
    }

    /// Every profile except the caller's own (the browse-users page).
    pub async fn list_users(&self, session: &str) -> Result<Vec<AuthUser>> {
        let me = self.auth().resolve(session).await?;
        let db = self.db()?;
        let users = db.list_users_except(me.uid)?;
        Ok(users.into_iter().map(AuthUser::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Username-or-email lookup. Anything containing `@` is treated as an
/// email; everything else as a username.
fn resolve_target(db: &Database, query: &str) -> Result<User> {
    let query = query.trim();
    let found = if query.contains('@') {
        let email = validate_email(query)?;
        db.find_user_by_email(&email)?
    } else {
        db.find_user_by_username(&query.to_lowercase())?
    };
    found.ok_or(ClientError::UserNotFound)
}

/// Joined, de-duplicated contact list for one user. Edges whose profile
/// document has gone missing are skipped rather than failing the whole
/// list.
pub(crate) fn contact_views(
    db: &Database,
    user_id: UserId,
) -> std::result::Result<Vec<ContactView>, StoreError> {
    let contacts = db.list_contacts_for_user(user_id)?;

    let mut seen = HashSet::new();
    let mut views = Vec::new();
    for contact in &contacts {
        if !seen.insert(contact.contact_id) {
            continue;
        }
        match db.get_user(contact.contact_id) {
            Ok(user) => views.push(ContactView::joined(contact, &user)),
            Err(StoreError::NotFound) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(views)
}

/// Incoming pending requests joined with sender profiles.
pub(crate) fn request_views(
    db: &Database,
    user_id: UserId,
) -> std::result::Result<Vec<RequestView>, StoreError> {
    let requests = db.pending_requests_to(user_id)?;

    let mut views = Vec::new();
    for request in &requests {
        match db.get_user(request.from_uid) {
            Ok(sender) => views.push(RequestView::joined(request, &sender)),
            Err(StoreError::NotFound) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use beeline_store::NotificationKind;

    use crate::auth::{AuthProvider, DEFAULT_SESSION_TTL_SECS};
    use crate::events::EventBus;

    fn test_client() -> Client {
        let db = Arc::new(Mutex::new(
            beeline_store::Database::open_in_memory().unwrap(),
        ));
        let auth = AuthProvider::new(Arc::clone(&db), DEFAULT_SESSION_TTL_SECS, true);
        Client::new(db, auth, EventBus::new())
    }

    async fn signed_up(client: &Client, name: &str) -> (AuthUser, String) {
        client
            .auth()
            .register(&format!("{name}@example.com"), "hunter22", name)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn send_request_creates_single_pending() {
        let client = test_client();
        let (alice, alice_token) = signed_up(&client, "alice").await;
        let (bob, bob_token) = signed_up(&client, "bob").await;

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
        assert_eq!(request.from_uid, alice.uid);
        assert_eq!(request.to_uid, bob.uid);
        assert_eq!(request.status, RequestStatus::Pending);

        let incoming = client.pending_requests(&bob_token).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].display_name, "alice");

        let sent = client.sent_requests(&alice_token).await.unwrap();
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn self_request_rejected_before_any_write() {
        let client = test_client();
        let (_, token) = signed_up(&client, "alice").await;

        let err = client
            .send_request(&token, "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SelfRequest));
        assert!(client.sent_requests(&token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let client = test_client();
        let (_, token) = signed_up(&client, "alice").await;

        let err = client
            .send_request(&token, "stranger@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UserNotFound));
    }

    #[tokio::test]
    async fn duplicate_request_is_rejected_both_directions() {
        let client = test_client();
        let (_, alice_token) = signed_up(&client, "alice").await;
        let (_, bob_token) = signed_up(&client, "bob").await;

        client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();

        let err = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RequestExists));

        let err = client
            .send_request(&bob_token, "alice@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RequestExists));
    }

    #[tokio::test]
    async fn accept_creates_both_edges_and_notifies_sender() {
        let client = test_client();
        let (alice, alice_token) = signed_up(&client, "alice").await;
        let (bob, bob_token) = signed_up(&client, "bob").await;

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
        client
            .respond_request(&bob_token, request.id, true)
            .await
            .unwrap();

        let alices = client.list_contacts(&alice_token).await.unwrap();
        let bobs = client.list_contacts(&bob_token).await.unwrap();
        assert_eq!(alices.len(), 1);
        assert_eq!(bobs.len(), 1);
        assert_eq!(alices[0].contact_id, bob.uid.to_string());
        assert_eq!(bobs[0].contact_id, alice.uid.to_string());
        // Both edges agree on the channel.
        assert_eq!(alices[0].chat_id, bobs[0].chat_id);

        let alice_notifications = client.notifications(&alice_token, true).await.unwrap();
        assert!(alice_notifications
            .iter()
            .any(|n| n.kind == NotificationKind::RequestAccepted && n.actor_uid == bob.uid));
    }

    #[tokio::test]
    async fn reject_creates_no_edges_and_allows_retry() {
        let client = test_client();
        let (_, alice_token) = signed_up(&client, "alice").await;
        let (_, bob_token) = signed_up(&client, "bob").await;

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
        client
            .respond_request(&bob_token, request.id, false)
            .await
            .unwrap();

        assert!(client.list_contacts(&alice_token).await.unwrap().is_empty());
        assert!(client.list_contacts(&bob_token).await.unwrap().is_empty());

        // A rejected pair can try again.
        client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn only_the_recipient_can_respond() {
        let client = test_client();
        let (_, alice_token) = signed_up(&client, "alice").await;
        signed_up(&client, "bob").await;
        let (_, carol_token) = signed_up(&client, "carol").await;

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();

        let err = client
            .respond_request(&carol_token, request.id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Forbidden));

        // The sender cannot accept their own request either.
        let err = client
            .respond_request(&alice_token, request.id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Forbidden));
    }

    #[tokio::test]
    async fn responding_twice_is_invalid_state() {
        let client = test_client();
        let (_, alice_token) = signed_up(&client, "alice").await;
        let (_, bob_token) = signed_up(&client, "bob").await;

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
        client
            .respond_request(&bob_token, request.id, true)
            .await
            .unwrap();

        let err = client
            .respond_request(&bob_token, request.id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidState));
    }

    #[tokio::test]
    async fn username_lookup_finds_target() {
        let client = test_client();
        let (_, alice_token) = signed_up(&client, "alice").await;
        let (bob, bob_token) = signed_up(&client, "bob").await;
        client.auth().claim_username(&bob_token, "bobby").await.unwrap();

        let found = client.lookup_user(&alice_token, "Bobby").await.unwrap();
        assert_eq!(found.uid, bob.uid);

        let request = client.send_request(&alice_token, "bobby").await.unwrap();
        assert_eq!(request.to_uid, bob.uid);
    }

    #[tokio::test]
    async fn remove_contact_is_one_sided() {
        let client = test_client();
        let (_, alice_token) = signed_up(&client, "alice").await;
        let (_, bob_token) = signed_up(&client, "bob").await;

        let request = client
            .send_request(&alice_token, "bob@example.com")
            .await
            .unwrap();
        client
            .respond_request(&bob_token, request.id, true)
            .await
            .unwrap();

        let alices = client.list_contacts(&alice_token).await.unwrap();
        let edge_id = Uuid::parse_str(&alices[0].id).unwrap();
        client.remove_contact(&alice_token, edge_id).await.unwrap();

        assert!(client.list_contacts(&alice_token).await.unwrap().is_empty());
        assert_eq!(client.list_contacts(&bob_token).await.unwrap().len(), 1);
    }
}
