//! The session/identity provider.
//!
//! Issues and resolves bearer session tokens, hashes credentials with
//! Argon2id, and publishes "current identity changed" notifications on a
//! watch channel that the rest of the app subscribes to. Sessions live in
//! an in-memory map with a TTL; expired entries resolve as unauthenticated
//! and are evicted by [`AuthProvider::purge_expired_sessions`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use beeline_shared::validate::{validate_email, validate_password};
use beeline_shared::UserId;
use beeline_store::{AuthAccount, Database, StoreError, User};

use crate::error::ClientError;
use crate::Result;

/// Default session lifetime: 7 days.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

const TOKEN_BYTES: usize = 32;

/// The signed-in identity handed to operation code and API responses.
/// A snapshot of the profile document; never carries credentials.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub uid: UserId,
    pub email: String,
    pub display_name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            uid: user.uid,
            email: user.email,
            display_name: user.display_name,
            username: user.username,
            photo_url: user.photo_url,
        }
    }
}

/// An issued session.
#[derive(Debug, Clone)]
struct SessionEntry {
    uid: UserId,
    expires_at: DateTime<Utc>,
}

impl SessionEntry {
    fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Issues, resolves, and revokes sessions.
#[derive(Clone)]
pub struct AuthProvider {
    db: Arc<Mutex<Database>>,
    /// token -> session.
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    /// The "current identity" watch channel.
    state_tx: Arc<watch::Sender<Option<AuthUser>>>,
    session_ttl: Duration,
    registration_open: bool,
}

impl AuthProvider {
    pub fn new(db: Arc<Mutex<Database>>, session_ttl_secs: i64, registration_open: bool) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            db,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            state_tx: Arc::new(state_tx),
            session_ttl: Duration::seconds(session_ttl_secs),
            registration_open,
        }
    }

    // ------------------------------------------------------------------
    // Sign-up / sign-in / sign-out
    // ------------------------------------------------------------------

    /// Create an auth account plus its profile document and issue a
    /// session. First sign-up materializes the user profile, exactly once.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<(AuthUser, String)> {
        if !self.registration_open {
            return Err(ClientError::RegistrationClosed);
        }

        let email = validate_email(email)?;
        validate_password(password)?;

        let display_name = display_name.trim();
        let display_name = if display_name.is_empty() {
            // Fall back to the mailbox name, like the login page does.
            email.split('@').next().unwrap_or_default().to_string()
        } else {
            display_name.to_string()
        };

        let uid = UserId::new();
        let now = Utc::now();
        let account = AuthAccount {
            uid,
            email: email.clone(),
            password_hash: hash_password(password)?,
            created_at: now,
        };
        let user = User {
            uid,
            email,
            display_name,
            username: None,
            photo_url: None,
            created_at: now,
        };

        {
            let mut db = self.db.lock().map_err(|_| ClientError::LockPoisoned)?;
            db.create_account_with_profile(&account, &user)
                .map_err(|e| match e {
                    StoreError::AlreadyExists => ClientError::EmailTaken,
                    other => ClientError::Store(other),
                })?;
        }

        info!(user = %uid, "registered new account");

        let auth_user = AuthUser::from(user);
        let token = self.issue_session(uid).await;
        let _ = self.state_tx.send(Some(auth_user.clone()));
        Ok((auth_user, token))
    }

    /// Verify credentials and issue a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(AuthUser, String)> {
        let email = validate_email(email)?;

        let (account, user) = {
            let db = self.db.lock().map_err(|_| ClientError::LockPoisoned)?;
            let account = db
                .find_account_by_email(&email)?
                .ok_or(ClientError::InvalidCredentials)?;
            let user = db.get_user(account.uid)?;
            (account, user)
        };

        if !verify_password(password, &account.password_hash) {
            debug!(user = %account.uid, "password verification failed");
            return Err(ClientError::InvalidCredentials);
        }

        info!(user = %account.uid, "signed in");

        let auth_user = AuthUser::from(user);
        let token = self.issue_session(account.uid).await;
        let _ = self.state_tx.send(Some(auth_user.clone()));
        Ok((auth_user, token))
    }

    /// Revoke a session. Unknown tokens are a no-op.
    pub async fn sign_out(&self, token: &str) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(token)
        };

        if let Some(entry) = removed {
            info!(user = %entry.uid, "signed out");
            let _ = self.state_tx.send(None);
        }
    }

    // ------------------------------------------------------------------
    // Session resolution
    // ------------------------------------------------------------------

    /// Resolve a session token to the signed-in user.
    ///
    /// Expired or unknown sessions fail with
    /// [`ClientError::Unauthenticated`].
    pub async fn resolve(&self, token: &str) -> Result<AuthUser> {
        let entry = {
            let sessions = self.sessions.read().await;
            sessions.get(token).cloned()
        };

        let entry = entry.ok_or(ClientError::Unauthenticated)?;
        if !entry.is_fresh() {
            let mut sessions = self.sessions.write().await;
            sessions.remove(token);
            return Err(ClientError::Unauthenticated);
        }

        let user = {
            let db = self.db.lock().map_err(|_| ClientError::LockPoisoned)?;
            db.get_user(entry.uid)?
        };
        Ok(AuthUser::from(user))
    }

    /// Subscribe to "current identity changed" notifications.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state_tx.subscribe()
    }

    /// Evict expired sessions from the map.
    pub async fn purge_expired_sessions(&self) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.is_fresh());
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "purged expired sessions");
        }
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    /// Claim a unique username for the signed-in user.
    pub async fn claim_username(&self, token: &str, username: &str) -> Result<AuthUser> {
        let me = self.resolve(token).await?;
        let username = beeline_shared::validate::normalize_username(username)?;

        {
            let db = self.db.lock().map_err(|_| ClientError::LockPoisoned)?;
            db.claim_username(me.uid, &username).map_err(|e| match e {
                StoreError::AlreadyExists => ClientError::UsernameTaken,
                other => ClientError::Store(other),
            })?;
        }

        info!(user = %me.uid, username = %username, "username claimed");
        self.resolve(token).await
    }

    /// Update the mutable profile fields of the signed-in user.
    pub async fn update_profile(
        &self,
        token: &str,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<AuthUser> {
        let me = self.resolve(token).await?;

        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&me.display_name)
            .to_string();
        let photo_url = photo_url
            .map(str::to_string)
            .or_else(|| me.photo_url.clone());

        {
            let db = self.db.lock().map_err(|_| ClientError::LockPoisoned)?;
            db.update_profile(me.uid, &display_name, photo_url.as_deref())?;
        }

        self.resolve(token).await
    }

    async fn issue_session(&self, uid: UserId) -> String {
        let token = generate_token();
        let entry = SessionEntry {
            uid,
            expires_at: Utc::now() + self.session_ttl,
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(token.clone(), entry);
        token
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn generate_token() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn hash_password(password: &str) -> Result<String> {
    let salt = argon2::password_hash::SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ClientError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .and_then(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed))
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> AuthProvider {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        AuthProvider::new(db, DEFAULT_SESSION_TTL_SECS, true)
    }

    #[tokio::test]
    async fn register_sign_in_round_trip() {
        let auth = provider();

        let (user, token) = auth
            .register("bee@example.com", "hunter22", "Bee")
            .await
            .unwrap();
        assert_eq!(user.display_name, "Bee");
        assert_eq!(auth.resolve(&token).await.unwrap().uid, user.uid);

        let (again, _) = auth.sign_in("bee@example.com", "hunter22").await.unwrap();
        assert_eq!(again.uid, user.uid);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let auth = provider();
        auth.register("bee@example.com", "hunter22", "Bee")
            .await
            .unwrap();

        let err = auth.sign_in("bee@example.com", "wrong-pass").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidCredentials));
    }

    #[tokio::test]
    async fn sign_out_revokes_the_session() {
        let auth = provider();
        let (_, token) = auth
            .register("bee@example.com", "hunter22", "Bee")
            .await
            .unwrap();

        auth.sign_out(&token).await;
        let err = auth.resolve(&token).await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let auth = provider();
        auth.register("bee@example.com", "hunter22", "Bee")
            .await
            .unwrap();

        let err = auth
            .register("bee@example.com", "other-pass", "Wasp")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::EmailTaken));
    }

    #[tokio::test]
    async fn closed_registration() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let auth = AuthProvider::new(db, DEFAULT_SESSION_TTL_SECS, false);

        let err = auth
            .register("bee@example.com", "hunter22", "Bee")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RegistrationClosed));
    }

    #[tokio::test]
    async fn username_claim_conflicts() {
        let auth = provider();
        let (_, bee_token) = auth
            .register("bee@example.com", "hunter22", "Bee")
            .await
            .unwrap();
        let (_, wasp_token) = auth
            .register("wasp@example.com", "hunter22", "Wasp")
            .await
            .unwrap();

        let claimed = auth.claim_username(&bee_token, "QueenBee").await.unwrap();
        assert_eq!(claimed.username.as_deref(), Some("queenbee"));

        let err = auth
            .claim_username(&wasp_token, "queenbee")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UsernameTaken));
    }

    #[tokio::test]
    async fn auth_state_watch_fires() {
        let auth = provider();
        let mut rx = auth.subscribe();
        assert!(rx.borrow().is_none());

        let (user, token) = auth
            .register("bee@example.com", "hunter22", "Bee")
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|u| u.uid), Some(user.uid));

        auth.sign_out(&token).await;
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }
}
