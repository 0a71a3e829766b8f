use anyhow::{Result, anyhow};
use rusqlite::{Connection, Row};
use tracing::{debug, info};

use crate::models::{ConversationRow, InboxRow, ParticipantRow};
use crate::{Database, OptionalExt, is_constraint_violation};

/// Canonical key for an unordered pair of users.
pub fn pair_key(user_a: &str, user_b: &str) -> String {
    if user_a <= user_b {
        format!("{user_a}:{user_b}")
    } else {
        format!("{user_b}:{user_a}")
    }
}

impl Database {
    // -- Conversations --

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, created_at, updated_at FROM conversations WHERE id = ?1",
                [id],
                map_conversation,
            )
            .optional()
        })
    }

    /// Returns the private conversation between two users, creating it (and
    /// both participant rows, in one transaction) if none exists. The bool is
    /// true when a new conversation was inserted.
    ///
    /// If a concurrent writer wins the `pair_key` uniqueness race, the insert
    /// fails and the existing conversation is looked up and returned instead.
    pub fn find_or_create_private_conversation(
        &self,
        new_id: &str,
        user_a: &str,
        user_b: &str,
        now: &str,
    ) -> Result<(ConversationRow, bool)> {
        let key = pair_key(user_a, user_b);

        self.with_conn_mut(|conn| {
            if let Some(existing) = query_by_pair_key(conn, &key)? {
                return Ok((existing, false));
            }

            match insert_private(conn, new_id, &key, user_a, user_b, now) {
                Ok(row) => {
                    info!("Created private conversation {} for {}", new_id, key);
                    Ok((row, true))
                }
                Err(e) if is_constraint_violation(&e) => {
                    debug!("Private conversation for {} created concurrently, re-reading", key);
                    let row = query_by_pair_key(conn, &key)?.ok_or(e)?;
                    Ok((row, false))
                }
                Err(e) => Err(e),
            }
        })
    }

    // -- Participants --

    pub fn get_participants(&self, conversation_id: &str) -> Result<Vec<ParticipantRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT p.user_id, u.username, u.avatar_url
                 FROM conversation_participants p
                 JOIN users u ON u.id = p.user_id
                 WHERE p.conversation_id = ?1
                 ORDER BY p.joined_at",
            )?;

            let rows = stmt
                .query_map([conversation_id], |row| {
                    Ok(ParticipantRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        avatar_url: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn is_participant(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
                    [conversation_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// One row per conversation the user belongs to, with the other member,
    /// latest message time and unread count for `user_id`. Unsorted.
    pub fn list_inbox(&self, user_id: &str) -> Result<Vec<InboxRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.created_at, op.user_id, u.username, u.avatar_url,
                        (SELECT MAX(m.created_at) FROM messages m WHERE m.conversation_id = c.id),
                        (SELECT COUNT(*) FROM messages m
                          WHERE m.conversation_id = c.id AND m.receiver_id = ?1 AND m.is_read = 0)
                 FROM conversation_participants p
                 JOIN conversations c ON c.id = p.conversation_id
                 LEFT JOIN conversation_participants op
                        ON op.conversation_id = c.id AND op.user_id != ?1
                 LEFT JOIN users u ON u.id = op.user_id
                 WHERE p.user_id = ?1
                 GROUP BY c.id",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(InboxRow {
                        conversation_id: row.get(0)?,
                        conversation_created_at: row.get(1)?,
                        other_user_id: row.get(2)?,
                        other_username: row.get(3)?,
                        other_avatar_url: row.get(4)?,
                        last_message_at: row.get(5)?,
                        unread_count: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_by_pair_key(conn: &Connection, key: &str) -> Result<Option<ConversationRow>> {
    conn.query_row(
        "SELECT id, created_at, updated_at
         FROM conversations
         WHERE pair_key = ?1 AND conversation_type = 'PRIVATE'",
        [key],
        map_conversation,
    )
    .optional()
}

fn insert_private(
    conn: &mut Connection,
    id: &str,
    key: &str,
    user_a: &str,
    user_b: &str,
    now: &str,
) -> Result<ConversationRow> {
    if user_a == user_b {
        return Err(anyhow!("A private conversation needs two distinct users"));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO conversations (id, conversation_type, pair_key, created_at, updated_at)
         VALUES (?1, 'PRIVATE', ?2, ?3, ?3)",
        [id, key, now],
    )?;
    for user_id in [user_a, user_b] {
        tx.execute(
            "INSERT INTO conversation_participants (conversation_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            [id, user_id, now],
        )?;
    }
    tx.commit()?;

    Ok(ConversationRow {
        id: id.to_string(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    })
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        created_at: row.get(1)?,
        updated_at: row.get(2)?,
    })
}
