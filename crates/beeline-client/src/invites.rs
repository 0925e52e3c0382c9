//! The invite flow.
//!
//! An invite is a bearer token with a fixed 24-hour lifetime. Redemption
//! is single-use: the store flips `pending -> accepted` conditionally in
//! the same transaction that creates the contact pair, so concurrent
//! redeemers cannot both succeed.

use chrono::Utc;
use tracing::info;

use beeline_shared::{ChatId, InviteToken};
use beeline_store::{Contact, Invite, InviteStatus};

use crate::client::Client;
use crate::error::ClientError;
use crate::events::EVENT_CONTACTS_CHANGED;
use crate::Result;

impl Client {
    /// Create a shareable invite. The returned invite's `id` is the
    /// `{token}` path segment of the `/invite/{token}` link.
    pub async fn create_invite(&self, session: &str) -> Result<Invite> {
        let me = self.auth().resolve(session).await?;
        let now = Utc::now();

        let invite = Invite {
            id: InviteToken::generate().as_str().to_string(),
            created_by: me.uid,
            creator_name: me.display_name.clone(),
            creator_photo: me.photo_url.clone(),
            status: InviteStatus::Pending,
            created_at: now,
            expires_at: InviteToken::expires_at(now),
            accepted_at: None,
            accepted_by: None,
        };

        {
            let db = self.db()?;
            db.insert_invite(&invite)?;
        }

        info!(invite = %invite.id, by = %me.uid, "invite created");
        Ok(invite)
    }

    /// Resolve an invite for the redemption page.
    ///
    /// Fails with the same errors redemption would: unknown token, the
    /// caller's own invite, already connected, already used, or expired.
    pub async fn lookup_invite(&self, session: &str, token: &str) -> Result<Invite> {
        let me = self.auth().resolve(session).await?;
        let token = InviteToken::parse(token)?;

        let db = self.db()?;
        let invite = db
            .find_invite(token.as_str())?
            .ok_or(ClientError::NotFound)?;

        if invite.created_by == me.uid {
            return Err(ClientError::SelfInvite);
        }
        if db.find_contact_between(me.uid, invite.created_by)?.is_some() {
            return Err(ClientError::AlreadyContacts);
        }
        if invite.status == InviteStatus::Accepted {
            return Err(ClientError::InviteRedeemed);
        }
        if invite.is_expired(Utc::now()) {
            return Err(ClientError::InviteExpired);
        }
        Ok(invite)
    }

    /// Redeem an invite: connect the caller with the invite's creator.
    ///
    /// Creates both contact edges (seeded with a "Chat started" marker)
    /// and spends the token, all in one store transaction. Expired or
    /// already-spent invites create nothing.
    pub async fn redeem_invite(&self, session: &str, token: &str) -> Result<ChatId> {
        let me = self.auth().resolve(session).await?;
        let invite = self.lookup_invite(session, token).await?;
        let now = Utc::now();

        let chat_id = {
            let mut db = self.db()?;

            let creator = db.get_user(invite.created_by)?;
            let my_profile = db.get_user(me.uid)?;

            let mut my_edge = Contact::edge(me.uid, &creator, now);
            let mut creator_edge = Contact::edge(creator.uid, &my_profile, now);
            for edge in [&mut my_edge, &mut creator_edge] {
                edge.last_chat_at = Some(now);
                edge.last_message = Some("Chat started".to_string());
            }

            let redeemed = db
                .redeem_invite(&invite.id, me.uid, (&my_edge, &creator_edge), now)
                .map_err(|e| match e {
                    beeline_store::StoreError::AlreadyExists => ClientError::AlreadyContacts,
                    other => ClientError::Store(other),
                })?;
            if !redeemed {
                // Someone else spent the token between lookup and flip.
                return Err(ClientError::InviteRedeemed);
            }

            my_edge.chat_id.clone()
        };

        info!(invite = %invite.id, by = %me.uid, "invite redeemed");

        self.events()
            .emit(EVENT_CONTACTS_CHANGED, invite.created_by, serde_json::json!({}));
        self.events()
            .emit(EVENT_CONTACTS_CHANGED, me.uid, serde_json::json!({}));
        Ok(chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::Duration;

    use crate::auth::{AuthProvider, DEFAULT_SESSION_TTL_SECS};
    use crate::events::EventBus;

    fn test_client() -> Client {
        let db = Arc::new(Mutex::new(
            beeline_store::Database::open_in_memory().unwrap(),
        ));
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
    async fn redeem_connects_both_parties() {
        let client = test_client();
        let creator_token = sign_up(&client, "creator").await;
        let guest_token = sign_up(&client, "guest").await;

        let invite = client.create_invite(&creator_token).await.unwrap();
        let chat_id = client
            .redeem_invite(&guest_token, &invite.id)
            .await
            .unwrap();

        let guests = client.list_contacts(&guest_token).await.unwrap();
        let creators = client.list_contacts(&creator_token).await.unwrap();
        assert_eq!(guests.len(), 1);
        assert_eq!(creators.len(), 1);
        assert_eq!(guests[0].chat_id, chat_id.as_str());
        assert_eq!(guests[0].last_message.as_deref(), Some("Chat started"));
    }

    #[tokio::test]
    async fn expired_invite_fails_and_creates_nothing() {
        let client = test_client();
        let creator_token = sign_up(&client, "creator").await;
        let guest_token = sign_up(&client, "guest").await;

        let invite = client.create_invite(&creator_token).await.unwrap();

        // Age the invite past its 24-hour window.
        {
            let db = client.db().unwrap();
            let stale = (Utc::now() - Duration::hours(25)).to_rfc3339();
            db.conn()
                .execute(
                    "UPDATE invites SET created_at = ?2, expires_at = ?2 WHERE id = ?1",
                    rusqlite::params![invite.id, stale],
                )
                .unwrap();
        }

        let err = client
            .redeem_invite(&guest_token, &invite.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InviteExpired));
        assert!(client.list_contacts(&guest_token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_redemption_fails_with_already_used() {
        let client = test_client();
        let creator_token = sign_up(&client, "creator").await;
        let guest_token = sign_up(&client, "guest").await;
        let late_token = sign_up(&client, "late").await;

        let invite = client.create_invite(&creator_token).await.unwrap();
        client
            .redeem_invite(&guest_token, &invite.id)
            .await
            .unwrap();

        let err = client
            .redeem_invite(&late_token, &invite.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InviteRedeemed));
        assert!(client.list_contacts(&late_token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn creator_cannot_redeem_their_own_invite() {
        let client = test_client();
        let creator_token = sign_up(&client, "creator").await;

        let invite = client.create_invite(&creator_token).await.unwrap();
        let err = client
            .redeem_invite(&creator_token, &invite.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SelfInvite));
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens() {
        let client = test_client();
        let token = sign_up(&client, "guest").await;

        let err = client.lookup_invite(&token, "not a token").await.unwrap_err();
        assert!(matches!(err, ClientError::InviteToken(_)));

        let missing = InviteToken::generate();
        let err = client
            .lookup_invite(&token, missing.as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NotFound));
    }
}
