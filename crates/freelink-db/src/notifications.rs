use anyhow::Result;
use rusqlite::Row;

use crate::models::{NewNotification, NotificationRow};
use crate::{Database, OptionalExt, now_timestamp};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, notification_type, title, message, action_url, icon, is_read, read_at, created_at";

impl Database {
    pub fn insert_notification(&self, n: &NewNotification<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications (id, user_id, notification_type, title, message, action_url, icon, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    n.id,
                    n.user_id,
                    n.notification_type,
                    n.title,
                    n.message,
                    n.action_url,
                    n.icon,
                    n.created_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1");
            conn.query_row(&sql, [id], map_notification).optional()
        })
    }

    /// Newest first, optionally restricted to one notification type.
    pub fn list_notifications(
        &self,
        user_id: &str,
        notification_type: Option<&str>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 AND (?2 IS NULL OR notification_type = ?2)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, notification_type, limit, offset],
                    map_notification,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_unread_notifications(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Returns false if the notification does not exist.
    pub fn mark_notification_read(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = COALESCE(read_at, ?2) WHERE id = ?1",
                [id, now_timestamp().as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = ?2 WHERE user_id = ?1 AND is_read = 0",
                [user_id, now_timestamp().as_str()],
            )?;
            Ok(changed)
        })
    }
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        notification_type: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        action_url: row.get(5)?,
        icon: row.get(6)?,
        is_read: row.get(7)?,
        read_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}
