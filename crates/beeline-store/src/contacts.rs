//! CRUD operations for [`Contact`] edge records.
//!
//! A mutual friendship is two directional rows. The pair is always written
//! through [`Database::insert_contact_pair`] (or the accept/redeem
//! transactions in the request and invite modules) so both halves commit or
//! neither does.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use beeline_shared::{ChatId, UserId};

use crate::database::Database;
use crate::error::{write_error, Result, StoreError};
use crate::models::Contact;
use crate::row::{opt_ts_col, ts_col, user_id_col, uuid_col};
use crate::watch::Collection;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert both halves of a mutual contact pair in one transaction.
    pub fn insert_contact_pair(&mut self, a: &Contact, b: &Contact) -> Result<()> {
        let tx = self.conn_mut().transaction()?;
        insert_contact(&tx, a)?;
        insert_contact(&tx, b)?;
        tx.commit()?;

        self.bus()
            .publish(Collection::Contacts, Some(a.user_id.to_string()));
        self.bus()
            .publish(Collection::Contacts, Some(b.user_id.to_string()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single contact edge by row id.
    pub fn get_contact(&self, id: Uuid) -> Result<Contact> {
        self.conn()
            .query_row(
                "SELECT id, user_id, contact_id, display_name, photo_url, chat_id,
                        last_chat_at, last_message, created_at
                 FROM contacts WHERE id = ?1",
                params![id.to_string()],
                row_to_contact,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The edge owned by `user_id` pointing at `contact_id`, if any.
    pub fn find_contact_between(
        &self,
        user_id: UserId,
        contact_id: UserId,
    ) -> Result<Option<Contact>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, user_id, contact_id, display_name, photo_url, chat_id,
                        last_chat_at, last_message, created_at
                 FROM contacts WHERE user_id = ?1 AND contact_id = ?2",
                params![user_id.to_string(), contact_id.to_string()],
                row_to_contact,
            )
            .optional()?)
    }

    /// All edges owned by a user, most recently active first; contacts
    /// that never chatted sort last.
    pub fn list_contacts_for_user(&self, user_id: UserId) -> Result<Vec<Contact>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, contact_id, display_name, photo_url, chat_id,
                    last_chat_at, last_message, created_at
             FROM contacts
             WHERE user_id = ?1
             ORDER BY (last_chat_at IS NULL) ASC, last_chat_at DESC, created_at DESC",
        )?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_contact)?;

        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete one edge, but only if it is owned by `user_id`. Returns
    /// `true` if a row was deleted. The reverse edge is untouched.
    pub fn delete_contact_for_user(&self, user_id: UserId, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM contacts WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id.to_string()],
        )?;

        if affected > 0 {
            self.bus()
                .publish(Collection::Contacts, Some(user_id.to_string()));
        }
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Insert a single edge inside an open transaction. Used by the accept and
/// redeem flows, which bundle the insert with a status flip.
pub(crate) fn insert_contact(conn: &Connection, contact: &Contact) -> Result<()> {
    conn.execute(
        "INSERT INTO contacts
             (id, user_id, contact_id, display_name, photo_url, chat_id,
              last_chat_at, last_message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            contact.id.to_string(),
            contact.user_id.to_string(),
            contact.contact_id.to_string(),
            contact.display_name,
            contact.photo_url,
            contact.chat_id.as_str(),
            contact.last_chat_at.map(|t| t.to_rfc3339()),
            contact.last_message,
            contact.created_at.to_rfc3339(),
        ],
    )
    .map_err(write_error)?;
    Ok(())
}

/// Map a `rusqlite::Row` to a [`Contact`].
fn row_to_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contact> {
    let chat_id: String = row.get(5)?;
    Ok(Contact {
        id: uuid_col(row, 0)?,
        user_id: user_id_col(row, 1)?,
        contact_id: user_id_col(row, 2)?,
        display_name: row.get(3)?,
        photo_url: row.get(4)?,
        chat_id: ChatId::from_raw(chat_id),
        last_chat_at: opt_ts_col(row, 6)?,
        last_message: row.get(7)?,
        created_at: ts_col(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            uid: UserId::new(),
            email: format!("{name}@example.com"),
            display_name: name.to_string(),
            username: None,
            photo_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pair_insert_and_list() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let bob = user("bob");
        let now = Utc::now();

        let a_edge = Contact::edge(alice.uid, &bob, now);
        let b_edge = Contact::edge(bob.uid, &alice, now);
        db.insert_contact_pair(&a_edge, &b_edge).unwrap();

        let for_alice = db.list_contacts_for_user(alice.uid).unwrap();
        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_alice[0].contact_id, bob.uid);
        assert_eq!(for_alice[0].chat_id, ChatId::for_pair(alice.uid, bob.uid));

        let for_bob = db.list_contacts_for_user(bob.uid).unwrap();
        assert_eq!(for_bob.len(), 1);
        assert_eq!(for_bob[0].contact_id, alice.uid);
    }

    #[test]
    fn duplicate_edge_rolls_back_whole_pair() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let bob = user("bob");
        let carol = user("carol");
        let now = Utc::now();

        db.insert_contact_pair(
            &Contact::edge(alice.uid, &bob, now),
            &Contact::edge(bob.uid, &alice, now),
        )
        .unwrap();

        // Second pair where one half collides: nothing new may land.
        let err = db
            .insert_contact_pair(
                &Contact::edge(carol.uid, &alice, now),
                &Contact::edge(alice.uid, &bob, now),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
        assert!(db.list_contacts_for_user(carol.uid).unwrap().is_empty());
    }

    #[test]
    fn delete_is_scoped_to_owner() {
        let mut db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        let bob = user("bob");
        let now = Utc::now();

        let a_edge = Contact::edge(alice.uid, &bob, now);
        let b_edge = Contact::edge(bob.uid, &alice, now);
        db.insert_contact_pair(&a_edge, &b_edge).unwrap();

        // Bob cannot delete Alice's edge.
        assert!(!db.delete_contact_for_user(bob.uid, a_edge.id).unwrap());
        assert!(db.delete_contact_for_user(alice.uid, a_edge.id).unwrap());

        // Bob's own edge survives.
        assert_eq!(db.list_contacts_for_user(bob.uid).unwrap().len(), 1);
    }
}
