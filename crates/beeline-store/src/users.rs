//! CRUD operations for [`User`] profile documents.

use rusqlite::{params, OptionalExtension};

use beeline_shared::UserId;

use crate::database::Database;
use crate::error::{write_error, Result, StoreError};
use crate::models::User;
use crate::row::{ts_col, user_id_col};
use crate::watch::Collection;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user profile. Fails with [`StoreError::AlreadyExists`]
    /// when the email is taken.
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
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

        self.bus()
            .publish(Collection::Users, Some(user.uid.to_string()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by uid.
    pub fn get_user(&self, uid: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT uid, email, display_name, username, photo_url, created_at
                 FROM users WHERE uid = ?1",
                params![uid.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Look up a user by email (already lowercased by the caller).
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT uid, email, display_name, username, photo_url, created_at
                 FROM users WHERE email = ?1",
                params![email],
                row_to_user,
            )
            .optional()?)
    }

    /// Look up a user by their unique lowercase username.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT uid, email, display_name, username, photo_url, created_at
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .optional()?)
    }

    /// All user profiles except the given one, newest first (the browse
    /// page behind the add-contact flow).
    pub fn list_users_except(&self, uid: UserId) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(
            "SELECT uid, email, display_name, username, photo_url, created_at
             FROM users
             WHERE uid != ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![uid.to_string()], row_to_user)?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Claim a username for a user.
    ///
    /// Uniqueness is enforced by the `users.username` unique column, not by
    /// a pre-check query, so two racing claims cannot both succeed.
    pub fn claim_username(&self, uid: UserId, username: &str) -> Result<()> {
        let affected = self
            .conn()
            .execute(
                "UPDATE users SET username = ?2 WHERE uid = ?1",
                params![uid.to_string(), username],
            )
            .map_err(write_error)?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        self.bus().publish(Collection::Users, Some(uid.to_string()));
        Ok(())
    }

    /// Update the mutable profile fields.
    pub fn update_profile(
        &self,
        uid: UserId,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET display_name = ?2, photo_url = ?3 WHERE uid = ?1",
            params![uid.to_string(), display_name, photo_url],
        )?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }

        self.bus().publish(Collection::Users, Some(uid.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`User`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        uid: user_id_col(row, 0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        username: row.get(3)?,
        photo_url: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_user(email: &str) -> User {
        User {
            uid: UserId::new(),
            email: email.to_string(),
            display_name: "Sample".to_string(),
            username: None,
            photo_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        let user = sample_user("a@example.com");
        db.create_user(&user).unwrap();

        assert_eq!(db.get_user(user.uid).unwrap(), user);
        assert_eq!(db.find_user_by_email("a@example.com").unwrap(), Some(user));
        assert_eq!(db.find_user_by_email("b@example.com").unwrap(), None);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&sample_user("a@example.com")).unwrap();

        let err = db.create_user(&sample_user("a@example.com")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
    }

    #[test]
    fn username_claim_is_unique() {
        let db = Database::open_in_memory().unwrap();
        let alice = sample_user("alice@example.com");
        let bob = sample_user("bob@example.com");
        db.create_user(&alice).unwrap();
        db.create_user(&bob).unwrap();

        db.claim_username(alice.uid, "alice").unwrap();
        let err = db.claim_username(bob.uid, "alice").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));

        let found = db.find_user_by_username("alice").unwrap().unwrap();
        assert_eq!(found.uid, alice.uid);
    }
}
