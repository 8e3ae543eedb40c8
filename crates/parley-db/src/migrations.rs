use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL,
            display_name  TEXT NOT NULL,
            avatar_url    TEXT,
            updated_at    TEXT NOT NULL
        );

        -- pair_key is the canonical 'min:max' participant pair, one row per pair
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            pair_key    TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id          TEXT NOT NULL,
            joined_at        TEXT NOT NULL,
            PRIMARY KEY (conversation_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON conversation_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id               TEXT PRIMARY KEY,
            conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id        TEXT NOT NULL,
            content          TEXT NOT NULL DEFAULT '',
            media_urls       TEXT NOT NULL DEFAULT '[]',
            media_type       TEXT NOT NULL DEFAULT 'none',
            created_at       TEXT NOT NULL,
            edited_at        TEXT,
            is_edited        INTEGER NOT NULL DEFAULT 0,
            deleted_at       TEXT,
            deleted_by       TEXT,
            is_read          INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        -- No uniqueness on emoji: the same emoji may be added twice by one user.
        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message_user
            ON reactions(message_id, user_id, created_at);

        CREATE TABLE IF NOT EXISTS blocks (
            blocker_id  TEXT NOT NULL,
            blocked_id  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (blocker_id, blocked_id)
        );

        CREATE INDEX IF NOT EXISTS idx_blocks_blocked
            ON blocks(blocked_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
