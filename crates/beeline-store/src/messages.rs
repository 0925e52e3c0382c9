//! CRUD operations for [`Message`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use beeline_shared::{ChatId, UserId};

use crate::database::Database;
use crate::error::{write_error, Result, StoreError};
use crate::models::{Message, MessageStatus};
use crate::row::{ts_col, user_id_col, uuid_col};
use crate::watch::Collection;

impl Database {
    /// Append a message and update the last-activity markers on both
    /// participants' contact edges, all in one transaction.
    pub fn append_message(&mut self, message: &Message) -> Result<()> {
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO messages
                 (id, chat_id, sender_uid, recipient_uid, text, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id.to_string(),
                message.chat_id.as_str(),
                message.sender_uid.to_string(),
                message.recipient_uid.to_string(),
                message.text,
                message.status.as_str(),
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(write_error)?;

        touch_contact(
            &tx,
            message.sender_uid,
            message.recipient_uid,
            message.created_at,
            &message.text,
        )?;
        touch_contact(
            &tx,
            message.recipient_uid,
            message.sender_uid,
            message.created_at,
            &message.text,
        )?;

        tx.commit()?;

        self.bus().publish(
            Collection::Messages,
            Some(message.chat_id.as_str().to_string()),
        );
        self.bus()
            .publish(Collection::Contacts, Some(message.sender_uid.to_string()));
        self.bus().publish(
            Collection::Contacts,
            Some(message.recipient_uid.to_string()),
        );
        Ok(())
    }

    /// All messages in a chat, strictly ascending by creation time (row id
    /// breaks ties so the order is total).
    pub fn messages_for_chat(&self, chat_id: &ChatId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, sender_uid, recipient_uid, text, status, created_at
             FROM messages
             WHERE chat_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![chat_id.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, chat_id, sender_uid, recipient_uid, text, status, created_at
                 FROM messages WHERE id = ?1",
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Flip every message addressed to `reader` in this chat to `read`.
    /// Returns how many messages changed.
    pub fn mark_chat_read(&self, chat_id: &ChatId, reader: UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET status = 'read'
             WHERE chat_id = ?1 AND recipient_uid = ?2 AND status = 'sent'",
            params![chat_id.as_str(), reader.to_string()],
        )?;

        if affected > 0 {
            self.bus()
                .publish(Collection::Messages, Some(chat_id.as_str().to_string()));
        }
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Refresh `last_chat_at` / `last_message` on the edge owned by `owner`.
/// Missing edges are ignored; messaging is only reachable between
/// established contacts.
fn touch_contact(
    conn: &Connection,
    owner: UserId,
    other: UserId,
    at: DateTime<Utc>,
    preview: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE contacts SET last_chat_at = ?3, last_message = ?4
         WHERE user_id = ?1 AND contact_id = ?2",
        params![
            owner.to_string(),
            other.to_string(),
            at.to_rfc3339(),
            preview,
        ],
    )?;
    Ok(())
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let chat_id: String = row.get(1)?;
    let status_str: String = row.get(5)?;
    let status = MessageStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown message status: {status_str}").into(),
        )
    })?;

    Ok(Message {
        id: uuid_col(row, 0)?,
        chat_id: ChatId::from_raw(chat_id),
        sender_uid: user_id_col(row, 2)?,
        recipient_uid: user_id_col(row, 3)?,
        text: row.get(4)?,
        status,
        created_at: ts_col(row, 6)?,
    })
}
