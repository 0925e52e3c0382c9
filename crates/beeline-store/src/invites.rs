//! CRUD operations for [`Invite`] records.
//!
//! Redemption is a conditional status flip bundled with the contact-pair
//! insert: the `WHERE status = 'pending'` clause is what makes each invite
//! single-use even under concurrent redeemers.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use beeline_shared::UserId;

use crate::contacts::insert_contact;
use crate::database::Database;
use crate::error::{write_error, Result};
use crate::models::{Contact, Invite, InviteStatus};
use crate::row::{opt_ts_col, opt_user_id_col, ts_col, user_id_col};
use crate::watch::Collection;

impl Database {
    /// Insert a freshly created invite.
    pub fn insert_invite(&self, invite: &Invite) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO invites
                     (id, created_by, creator_name, creator_photo, status,
                      created_at, expires_at, accepted_at, accepted_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    invite.id,
                    invite.created_by.to_string(),
                    invite.creator_name,
                    invite.creator_photo,
                    invite.status.as_str(),
                    invite.created_at.to_rfc3339(),
                    invite.expires_at.to_rfc3339(),
                    invite.accepted_at.map(|t| t.to_rfc3339()),
                    invite.accepted_by.map(|u| u.to_string()),
                ],
            )
            .map_err(write_error)?;

        self.bus()
            .publish(Collection::Invites, Some(invite.id.clone()));
        Ok(())
    }

    /// Look up an invite by its token. Unknown tokens are simply absent.
    pub fn find_invite(&self, token: &str) -> Result<Option<Invite>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, created_by, creator_name, creator_photo, status,
                        created_at, expires_at, accepted_at, accepted_by
                 FROM invites WHERE id = ?1",
                params![token],
                row_to_invite,
            )
            .optional()?)
    }

    /// Redeem an invite: flip `pending -> accepted` and insert both contact
    /// edges in one transaction.
    ///
    /// Returns `false` (writing nothing) when the invite was already
    /// redeemed -- the conditional update is the single-use guarantee, so a
    /// second concurrent redeemer loses cleanly instead of also succeeding.
    pub fn redeem_invite(
        &mut self,
        token: &str,
        redeemed_by: UserId,
        edges: (&Contact, &Contact),
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        let affected = tx.execute(
            "UPDATE invites
             SET status = 'accepted', accepted_at = ?2, accepted_by = ?3
             WHERE id = ?1 AND status = 'pending'",
            params![token, now.to_rfc3339(), redeemed_by.to_string()],
        )?;

        if affected == 0 {
            return Ok(false);
        }

        insert_contact(&tx, edges.0)?;
        insert_contact(&tx, edges.1)?;

        tx.commit()?;

        self.bus()
            .publish(Collection::Invites, Some(token.to_string()));
        self.bus()
            .publish(Collection::Contacts, Some(edges.0.user_id.to_string()));
        self.bus()
            .publish(Collection::Contacts, Some(edges.1.user_id.to_string()));
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to an [`Invite`].
fn row_to_invite(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invite> {
    let status_str: String = row.get(4)?;
    let status = InviteStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown invite status: {status_str}").into(),
        )
    })?;

    Ok(Invite {
        id: row.get(0)?,
        created_by: user_id_col(row, 1)?,
        creator_name: row.get(2)?,
        creator_photo: row.get(3)?,
        status,
        created_at: ts_col(row, 5)?,
        expires_at: ts_col(row, 6)?,
        accepted_at: opt_ts_col(row, 7)?,
        accepted_by: opt_user_id_col(row, 8)?,
    })
}
