use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY,
            email               TEXT NOT NULL UNIQUE,
            username            TEXT NOT NULL UNIQUE,
            password            TEXT NOT NULL,
            profile_image_url   TEXT NOT NULL,
            role                TEXT NOT NULL DEFAULT 'user',
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid                TEXT NOT NULL UNIQUE,
            created_by_user_id  TEXT NOT NULL REFERENCES users(id),
            queries             TEXT NOT NULL DEFAULT '[]',
            created_at          TEXT NOT NULL,
            deleted_at          TEXT,
            is_deleted          INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_owner
            ON conversations(created_by_user_id, is_deleted);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
