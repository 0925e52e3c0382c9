//! CRUD operations for [`AuthAccount`] records.
//!
//! Auth accounts belong to the identity provider layer; the rest of the app
//! only ever sees [`User`](crate::models::User) profiles.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{write_error, Result};
use crate::models::{AuthAccount, User};
use crate::row::{ts_col, user_id_col};
use crate::watch::Collection;

impl Database {
    /// Create the auth account together with its profile document, in one
    /// transaction. First sign-up materializes both or neither.
    pub fn create_account_with_profile(
        &mut self,
        account: &AuthAccount,
        user: &User,
    ) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO auth_accounts (uid, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                account.uid.to_string(),
                account.email,
                account.password_hash,
                account.created_at.to_rfc3339(),
            ],
        )
        .map_err(write_error)?;

        tx.execute(
            "INSERT INTO users (uid, email, display_name, username, photo_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.uid.to_string(),
                user.email,
                user.display_name,
                user.username,
                user.photo_url,
                user.created_at.to_rfc3339(),
            ],
        )
        .map_err(write_error)?;

        tx.commit()?;

        self.bus()
            .publish(Collection::Users, Some(user.uid.to_string()));
        Ok(())
    }

    /// Look up an auth account by email (already lowercased by the caller).
    pub fn find_account_by_email(&self, email: &str) -> Result<Option<AuthAccount>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT uid, email, password_hash, created_at
                 FROM auth_accounts WHERE email = ?1",
                params![email],
                row_to_account,
            )
            .optional()?)
    }
}

/// Map a `rusqlite::Row` to an [`AuthAccount`].
fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuthAccount> {
    Ok(AuthAccount {
        uid: user_id_col(row, 0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: ts_col(row, 3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use beeline_shared::UserId;
    use chrono::Utc;

    fn account_and_user(email: &str) -> (AuthAccount, User) {
        let uid = UserId::new();
        let now = Utc::now();
        (
            AuthAccount {
                uid,
                email: email.to_string(),
                password_hash: "$argon2id$stub".to_string(),
                created_at: now,
            },
            User {
                uid,
                email: email.to_string(),
                display_name: "Sample".to_string(),
                username: None,
                photo_url: None,
                created_at: now,
            },
        )
    }

    #[test]
    fn account_creation_is_atomic_with_profile() {
        let mut db = Database::open_in_memory().unwrap();
        let (account, user) = account_and_user("a@example.com");
        db.create_account_with_profile(&account, &user).unwrap();

        assert!(db.find_account_by_email("a@example.com").unwrap().is_some());
        assert!(db.find_user_by_email("a@example.com").unwrap().is_some());

        // Second registration with the same email rolls back entirely:
        // no orphan profile row for the new uid.
        let (dup_account, dup_user) = account_and_user("a@example.com");
        let err = db
            .create_account_with_profile(&dup_account, &dup_user)
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
        assert!(matches!(
            db.get_user(dup_user.uid),
            Err(StoreError::NotFound)
        ));
    }
}
