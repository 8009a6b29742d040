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
        info!("Running migration v1 (activity + tell mailbox)");
        conn.execute_batch(
            "
            CREATE TABLE user_activity (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                nickname        TEXT NOT NULL,
                channel         TEXT NOT NULL,
                last_message    TEXT NOT NULL,
                last_seen       TEXT NOT NULL,
                UNIQUE(nickname, channel)
            );

            CREATE INDEX idx_user_activity_nickname
                ON user_activity(nickname);

            CREATE TABLE tell_messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                sender          TEXT NOT NULL,
                sender_key      TEXT NOT NULL,
                recipient       TEXT NOT NULL,
                channel         TEXT NOT NULL,
                message         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                delivered       INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_tell_messages_recipient
                ON tell_messages(recipient, delivered);

            CREATE INDEX idx_tell_messages_quota
                ON tell_messages(sender_key, recipient, channel, delivered);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
