//! The two-party chat room.
//!
//! Channel identity is derived, never negotiated: both participants compute
//! the same [`ChatId`] from the sorted uid pair. Sending appends one
//! immutable message and refreshes the last-activity markers on both
//! contact edges in the same transaction.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use beeline_shared::validate::normalize_message_text;
use beeline_shared::{ChatId, UserId};
use beeline_store::{Message, MessageStatus, StoreError};

use crate::auth::AuthUser;
use crate::client::Client;
use crate::error::ClientError;
use crate::events::{NewMessagePayload, EVENT_NEW_MESSAGE};
use crate::Result;

impl Client {
    /// Send a message to a contact.
    ///
    /// Strangers are rejected: a contact edge from the caller to `peer`
    /// must exist. The message timestamp is assigned here, not by the
    /// caller, so channel ordering follows the store's clock.
    pub async fn send_message(&self, session: &str, peer: UserId, text: &str) -> Result<Message> {
        let me = self.auth().resolve(session).await?;
        let text = normalize_message_text(text)?;

        let message = {
            let mut db = self.db()?;

            if db.find_contact_between(me.uid, peer)?.is_none() {
                return Err(ClientError::NotContacts);
            }

            let message = Message {
                id: Uuid::new_v4(),
                chat_id: ChatId::for_pair(me.uid, peer),
                sender_uid: me.uid,
                recipient_uid: peer,
                text,
                status: MessageStatus::Sent,
                created_at: Utc::now(),
            };
            db.append_message(&message)?;
            message
        };

        info!(msg_id = %message.id, chat = %message.chat_id, "message sent");

        self.events().emit(
            EVENT_NEW_MESSAGE,
            peer,
            NewMessagePayload {
                chat_id: message.chat_id.as_str().to_string(),
                sender: me.uid.to_string(),
                timestamp: message.created_at.to_rfc3339(),
            },
        );
        Ok(message)
    }

    /// The full message history with `peer`, strictly ascending by
    /// creation time.
    pub async fn list_messages(&self, session: &str, peer: UserId) -> Result<Vec<Message>> {
        let me = self.auth().resolve(session).await?;
        let chat_id = ChatId::for_pair(me.uid, peer);

        let db = self.db()?;
        Ok(db.messages_for_chat(&chat_id)?)
    }

    /// Mark everything `peer` sent the caller in this chat as read.
    pub async fn mark_read(&self, session: &str, peer: UserId) -> Result<usize> {
        let me = self.auth().resolve(session).await?;
        let chat_id = ChatId::for_pair(me.uid, peer);

        let db = self.db()?;
        Ok(db.mark_chat_read(&chat_id, me.uid)?)
    }

    /// The other participant's profile, for the chat header.
    pub async fn peer_profile(&self, session: &str, peer: UserId) -> Result<AuthUser> {
        self.auth().resolve(session).await?;

        let db = self.db()?;
        let user = db.get_user(peer).map_err(|e| match e {
            StoreError::NotFound => ClientError::UserNotFound,
            other => ClientError::Store(other),
        })?;
        Ok(AuthUser::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::auth::{AuthProvider, AuthUser, DEFAULT_SESSION_TTL_SECS};
    use crate::events::EventBus;

    fn test_client() -> Client {
        let db = Arc::new(Mutex::new(
            beeline_store::Database::open_in_memory().unwrap(),
        ));
        let auth = AuthProvider::new(Arc::clone(&db), DEFAULT_SESSION_TTL_SECS, true);
        Client::new(db, auth, EventBus::new())
    }

    async fn connected_pair(client: &Client) -> ((AuthUser, String), (AuthUser, String)) {
        let alice = client
            .auth()
            .register("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();
        let bob = client
            .auth()
            .register("bob@example.com", "hunter22", "bob")
            .await
            .unwrap();

        let request = client
            .send_request(&alice.1, "bob@example.com")
            .await
            .unwrap();
        client.respond_request(&bob.1, request.id, true).await.unwrap();
        (alice, bob)
    }

    #[tokio::test]
    async fn strangers_cannot_message() {
        let client = test_client();
        let (_, alice_token) = client
            .auth()
            .register("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();
        let (bob, _) = client
            .auth()
            .register("bob@example.com", "hunter22", "bob")
            .await
            .unwrap();

        let err = client
            .send_message(&alice_token, bob.uid, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotContacts));
    }

    #[tokio::test]
    async fn blank_messages_are_rejected() {
        let client = test_client();
        let ((_, alice_token), (bob, _)) = connected_pair(&client).await;

        let err = client
            .send_message(&alice_token, bob.uid, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn messages_come_back_in_send_order_for_both_sides() {
        let client = test_client();
        let ((alice, alice_token), (bob, bob_token)) = connected_pair(&client).await;

        client
            .send_message(&alice_token, bob.uid, "one")
            .await
            .unwrap();
        client
            .send_message(&bob_token, alice.uid, "two")
            .await
            .unwrap();
        client
            .send_message(&alice_token, bob.uid, "three")
            .await
            .unwrap();

        let texts = |messages: Vec<Message>| -> Vec<String> {
            messages.into_iter().map(|m| m.text).collect()
        };

        // Both participants derive the same channel and see the same order.
        let from_alice = texts(client.list_messages(&alice_token, bob.uid).await.unwrap());
        let from_bob = texts(client.list_messages(&bob_token, alice.uid).await.unwrap());
        assert_eq!(from_alice, vec!["one", "two", "three"]);
        assert_eq!(from_alice, from_bob);
    }

    #[tokio::test]
    async fn sending_updates_last_activity_markers() {
        let client = test_client();
        let ((_, alice_token), (bob, bob_token)) = connected_pair(&client).await;

        client
            .send_message(&alice_token, bob.uid, "fresh honey")
            .await
            .unwrap();

        for token in [&alice_token, &bob_token] {
            let contacts = client.list_contacts(token).await.unwrap();
            assert_eq!(contacts[0].last_message.as_deref(), Some("fresh honey"));
            assert!(contacts[0].last_chat_at.is_some());
        }
    }

    #[tokio::test]
    async fn mark_read_flips_only_the_readers_inbox() {
        let client = test_client();
        let ((alice, alice_token), (bob, bob_token)) = connected_pair(&client).await;

        client
            .send_message(&alice_token, bob.uid, "to bob")
            .await
            .unwrap();
        client
            .send_message(&bob_token, alice.uid, "to alice")
            .await
            .unwrap();

        assert_eq!(client.mark_read(&bob_token, alice.uid).await.unwrap(), 1);

        let messages = client.list_messages(&alice_token, bob.uid).await.unwrap();
        let status_of = |text: &str| {
            messages
                .iter()
                .find(|m| m.text == text)
                .map(|m| m.status)
                .unwrap()
        };
        assert_eq!(status_of("to bob"), MessageStatus::Read);
        assert_eq!(status_of("to alice"), MessageStatus::Sent);
    }
}
