use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

/// Create the schema. Every statement is idempotent, so this runs on
/// every boot.
pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS follows (
            follower_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            followed_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at   TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (follower_id, followed_id)
        );

        CREATE TABLE IF NOT EXISTS posts (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS comments (
            id          TEXT PRIMARY KEY,
            post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- participant_key is the sorted, joined participant ids; the
        -- UNIQUE constraint is what makes conversation dedup atomic.
        CREATE TABLE IF NOT EXISTS conversations (
            id               TEXT PRIMARY KEY,
            participant_key  TEXT NOT NULL UNIQUE,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id          TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            PRIMARY KEY (conversation_id, user_id)
        );

        -- Messages carry no id column; a message is identified by its
        -- place in the thread, with rowid breaking sent_at ties.
        CREATE TABLE IF NOT EXISTS messages (
            conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id        TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            content          TEXT NOT NULL,
            sent_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, sent_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id                TEXT PRIMARY KEY,
            recipient_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            message           TEXT NOT NULL,
            kind              TEXT NOT NULL CHECK (kind IN ('follow', 'message', 'comment')),
            content_redirect  TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            read              INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
