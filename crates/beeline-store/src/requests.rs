//! CRUD operations for [`ContactRequest`] records.
//!
//! The lifecycle is `pending -> accepted | rejected`, with terminal states
//! never revisited. Accepting flips the status and inserts both contact
//! edges in one transaction; a failure in either half rolls back the whole
//! response.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use beeline_shared::UserId;

use crate::contacts::insert_contact;
use crate::database::Database;
use crate::error::{write_error, Result, StoreError};
use crate::models::{Contact, ContactRequest, RequestStatus};
use crate::row::{ts_col, user_id_col, uuid_col};
use crate::watch::Collection;

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new pending request.
    ///
    /// The partial unique index over `pair_key` rejects the insert with
    /// [`StoreError::AlreadyExists`] when a pending or accepted request
    /// already links the pair, in either direction.
    pub fn insert_request(&self, request: &ContactRequest) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO contact_requests
                     (id, from_uid, to_uid, pair_key, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    request.id.to_string(),
                    request.from_uid.to_string(),
                    request.to_uid.to_string(),
                    request.pair_key,
                    request.status.as_str(),
                    request.created_at.to_rfc3339(),
                    request.updated_at.to_rfc3339(),
                ],
            )
            .map_err(write_error)?;

        self.publish_request_change(request.from_uid, request.to_uid);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single request by id.
    pub fn get_request(&self, id: Uuid) -> Result<ContactRequest> {
        self.conn()
            .query_row(
                "SELECT id, from_uid, to_uid, pair_key, status, created_at, updated_at
                 FROM contact_requests WHERE id = ?1",
                params![id.to_string()],
                row_to_request,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Incoming requests still awaiting a response, newest first.
    pub fn pending_requests_to(&self, uid: UserId) -> Result<Vec<ContactRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_uid, to_uid, pair_key, status, created_at, updated_at
             FROM contact_requests
             WHERE to_uid = ?1 AND status = 'pending'
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![uid.to_string()], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// All requests this user ever sent, newest first.
    pub fn requests_from(&self, uid: UserId) -> Result<Vec<ContactRequest>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, from_uid, to_uid, pair_key, status, created_at, updated_at
             FROM contact_requests
             WHERE from_uid = ?1
             ORDER BY created_at DESC",
        )?;

        let rows = stmt.query_map(params![uid.to_string()], row_to_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// Whether a pending or accepted request already links this pair.
    /// Only used for a friendlier error before the insert; the unique
    /// index is what actually closes the race.
    pub fn live_request_exists(&self, pair_key: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM contact_requests
             WHERE pair_key = ?1 AND status IN ('pending', 'accepted')",
            params![pair_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ------------------------------------------------------------------
    // Respond
    // ------------------------------------------------------------------

    /// Accept a pending request: flip its status and insert both contact
    /// edges, all in one transaction.
    ///
    /// Returns `false` (writing nothing) when the request was no longer
    /// pending, e.g. a double-click or a concurrent response.
    pub fn accept_request(
        &mut self,
        request_id: Uuid,
        edges: (&Contact, &Contact),
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        let affected = tx.execute(
            "UPDATE contact_requests
             SET status = 'accepted', updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![request_id.to_string(), now.to_rfc3339()],
        )?;

        if affected == 0 {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }

        insert_contact(&tx, edges.0)?;
        insert_contact(&tx, edges.1)?;

        tx.commit()?;

        self.publish_request_change(edges.0.user_id, edges.1.user_id);
        self.bus()
            .publish(Collection::Contacts, Some(edges.0.user_id.to_string()));
        self.bus()
            .publish(Collection::Contacts, Some(edges.1.user_id.to_string()));
        Ok(true)
    }

    /// Reject a pending request. Returns `false` when the request was no
    /// longer pending. No contact edges are created.
    pub fn reject_request(&self, request_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE contact_requests
             SET status = 'rejected', updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![request_id.to_string(), now.to_rfc3339()],
        )?;

        if affected > 0 {
            let request = self.get_request(request_id)?;
            self.publish_request_change(request.from_uid, request.to_uid);
        }
        Ok(affected > 0)
    }

    fn publish_request_change(&self, a: UserId, b: UserId) {
        self.bus()
            .publish(Collection::ContactRequests, Some(a.to_string()));
        self.bus()
            .publish(Collection::ContactRequests, Some(b.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`ContactRequest`].
fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContactRequest> {
    let status_str: String = row.get(4)?;
    let status = RequestStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown request status: {status_str}").into(),
        )
    })?;

    Ok(ContactRequest {
        id: uuid_col(row, 0)?,
        from_uid: user_id_col(row, 1)?,
        to_uid: user_id_col(row, 2)?,
        pair_key: row.get(3)?,
        status,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}
