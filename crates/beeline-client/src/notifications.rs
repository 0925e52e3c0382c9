//! Notification reads and acknowledgements.
//!
//! Notifications are written by the contact-request flow; this module only
//! exposes the recipient-side surface.

use uuid::Uuid;

use beeline_store::Notification;

use crate::client::Client;
use crate::error::ClientError;
use crate::Result;

impl Client {
    /// The caller's notifications, newest first.
    pub async fn notifications(&self, session: &str, unread_only: bool) -> Result<Vec<Notification>> {
        let me = self.auth().resolve(session).await?;
        let db = self.db()?;
        Ok(db.notifications_for_user(me.uid, unread_only)?)
    }

    /// Acknowledge one notification. Only the recipient can mark their
    /// own notifications read.
    pub async fn mark_notification_read(&self, session: &str, id: Uuid) -> Result<()> {
        let me = self.auth().resolve(session).await?;

        let changed = {
            let db = self.db()?;
            db.mark_notification_read(id, me.uid)?
        };
        if !changed {
            return Err(ClientError::NotFound);
        }
        Ok(())
    }
}
