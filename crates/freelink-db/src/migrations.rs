use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                bio                 TEXT,
                avatar_url          TEXT,
                github_link         TEXT,
                skills              TEXT NOT NULL DEFAULT '[]',
                reputation_points   INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            -- pair_key is the canonical <min-id>:<max-id> of a PRIVATE
            -- conversation; the UNIQUE constraint keeps one per user pair.
            CREATE TABLE conversations (
                id                  TEXT PRIMARY KEY,
                conversation_type   TEXT NOT NULL DEFAULT 'PRIVATE',
                pair_key            TEXT UNIQUE,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE conversation_participants (
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id),
                joined_at       TEXT NOT NULL,
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE INDEX idx_participants_user
                ON conversation_participants(user_id);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                sender_id       TEXT NOT NULL REFERENCES users(id),
                receiver_id     TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                attachment_url  TEXT,
                message_type    TEXT NOT NULL DEFAULT 'TEXT',
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            CREATE INDEX idx_messages_receiver_unread
                ON messages(receiver_id, is_read);

            CREATE TABLE notifications (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                notification_type   TEXT NOT NULL,
                title               TEXT NOT NULL,
                message             TEXT NOT NULL,
                action_url          TEXT,
                icon                TEXT NOT NULL,
                is_read             INTEGER NOT NULL DEFAULT 0,
                read_at             TEXT,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user
                ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
