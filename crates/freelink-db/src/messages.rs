use anyhow::Result;
use rusqlite::Row;

use crate::models::{MessageRow, NewMessage};
use crate::{Database, OptionalExt};

// JOIN users to fetch both usernames in a single query (eliminates N+1)
const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.sender_id, s.username, m.receiver_id, r.username,
                                     m.content, m.is_read, m.attachment_url, m.message_type, m.created_at
                              FROM messages m
                              LEFT JOIN users s ON s.id = m.sender_id
                              LEFT JOIN users r ON r.id = m.receiver_id";

impl Database {
    /// Stores a message and bumps the conversation's `updated_at`.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, content, is_read, attachment_url, message_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
                rusqlite::params![
                    msg.id,
                    msg.conversation_id,
                    msg.sender_id,
                    msg.receiver_id,
                    msg.content,
                    msg.attachment_url,
                    msg.message_type,
                    msg.created_at,
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                [msg.conversation_id, msg.created_at],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            conn.query_row(&sql, [id], map_message).optional()
        })
    }

    /// Newest first. Ties on `created_at` fall back to insertion order.
    pub fn get_conversation_messages(
        &self,
        conversation_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.conversation_id = ?1
                 ORDER BY m.created_at DESC, m.rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![conversation_id, limit, offset], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flips every unread message in the conversation addressed to `receiver_id`.
    /// Returns how many rows changed.
    pub fn mark_conversation_read(&self, conversation_id: &str, receiver_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                [conversation_id, receiver_id],
            )?;
            Ok(changed)
        })
    }

    /// Returns false if no such message existed.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn count_unread_messages(&self, receiver_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND is_read = 0",
                [receiver_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
        receiver_id: row.get(4)?,
        receiver_username: row.get::<_, Option<String>>(5)?.unwrap_or_else(|| "unknown".to_string()),
        content: row.get(6)?,
        is_read: row.get(7)?,
        attachment_url: row.get(8)?,
        message_type: row.get(9)?,
        created_at: row.get(10)?,
    })
}
