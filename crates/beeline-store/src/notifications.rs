//! CRUD operations for [`Notification`] records.

use rusqlite::params;
use uuid::Uuid;

use beeline_shared::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Notification, NotificationKind};
use crate::row::{ts_col, user_id_col, uuid_col};
use crate::watch::Collection;

impl Database {
    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications
                 (id, user_id, kind, actor_uid, actor_name, is_read, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.kind.as_str(),
                notification.actor_uid.to_string(),
                notification.actor_name,
                notification.is_read,
                notification.created_at.to_rfc3339(),
            ],
        )?;

        self.bus().publish(
            Collection::Notifications,
            Some(notification.user_id.to_string()),
        );
        Ok(())
    }

    /// A user's notifications, newest first. `unread_only` narrows to the
    /// ones not yet marked read.
    pub fn notifications_for_user(
        &self,
        user_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>> {
        let sql = if unread_only {
            "SELECT id, user_id, kind, actor_uid, actor_name, is_read, created_at
             FROM notifications
             WHERE user_id = ?1 AND is_read = 0
             ORDER BY created_at DESC"
        } else {
            "SELECT id, user_id, kind, actor_uid, actor_name, is_read, created_at
             FROM notifications
             WHERE user_id = ?1
             ORDER BY created_at DESC"
        };
        let mut stmt = self.conn().prepare(sql)?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_notification)?;

        let mut notifications = Vec::new();
        for row in rows {
            notifications.push(row?);
        }
        Ok(notifications)
    }

    /// Mark one notification read, but only if it belongs to `user_id`.
    /// Returns `true` if a row changed.
    pub fn mark_notification_read(&self, id: Uuid, user_id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE notifications SET is_read = 1
             WHERE id = ?1 AND user_id = ?2 AND is_read = 0",
            params![id.to_string(), user_id.to_string()],
        )?;

        if affected > 0 {
            self.bus()
                .publish(Collection::Notifications, Some(user_id.to_string()));
        }
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Notification`].
fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let kind_str: String = row.get(2)?;
    let kind = NotificationKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown notification kind: {kind_str}").into(),
        )
    })?;

    Ok(Notification {
        id: uuid_col(row, 0)?,
        user_id: user_id_col(row, 1)?,
        kind,
        actor_uid: user_id_col(row, 3)?,
        actor_name: row.get(4)?,
        is_read: row.get(5)?,
        created_at: ts_col(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn unread_filter_and_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let recipient = UserId::new();
        let actor = UserId::new();

        let n = Notification::new(
            recipient,
            NotificationKind::RequestAccepted,
            actor,
            "Alice".to_string(),
            Utc::now(),
        );
        db.insert_notification(&n).unwrap();

        assert_eq!(db.notifications_for_user(recipient, true).unwrap().len(), 1);

        // Someone else cannot mark it read.
        assert!(!db.mark_notification_read(n.id, actor).unwrap());
        assert!(db.mark_notification_read(n.id, recipient).unwrap());

        assert!(db.notifications_for_user(recipient, true).unwrap().is_empty());
        assert_eq!(db.notifications_for_user(recipient, false).unwrap().len(), 1);
    }
}
