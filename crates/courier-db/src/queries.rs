use crate::Database;
use crate::models::{ActivityRow, TellRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};

use courier_types::events::normalize_nick;

/// Result of trying to leave a message in someone's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TellOutcome {
    /// Stored under the returned row id.
    Queued(i64),
    /// The sender already has `quota` undelivered messages for this
    /// recipient in this channel; nothing was written.
    QuotaReached,
}

impl Database {
    // -- Activity --

    /// Upsert the latest line for (nickname, channel). The nickname is stored
    /// as given; callers normalize it.
    pub fn record_activity(
        &self,
        nickname: &str,
        channel: &str,
        message: &str,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_activity (nickname, channel, last_message, last_seen)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(nickname, channel) DO UPDATE SET
                     last_message = excluded.last_message,
                     last_seen = excluded.last_seen",
                rusqlite::params![nickname, channel, message, seen_at],
            )?;
            Ok(())
        })
    }

    pub fn last_seen(&self, nickname: &str, channel: &str) -> Result<Option<ActivityRow>> {
        self.with_conn(|conn| query_last_seen(conn, nickname, channel))
    }

    // -- Tell mailbox --

    pub fn count_pending_tells(&self, sender: &str, recipient: &str, channel: &str) -> Result<u32> {
        self.with_conn(|conn| count_pending(conn, sender, recipient, channel))
    }

    /// Count-then-insert under one IMMEDIATE transaction, so two writers can
    /// never both see room for the last slot. The quota is keyed on the
    /// normalized sender; `sender` is kept as typed for display.
    pub fn queue_tell(
        &self,
        sender: &str,
        recipient: &str,
        channel: &str,
        message: &str,
        created_at: DateTime<Utc>,
        quota: u32,
    ) -> Result<TellOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if count_pending(&tx, sender, recipient, channel)? >= quota {
                return Ok(TellOutcome::QuotaReached);
            }

            tx.execute(
                "INSERT INTO tell_messages (sender, sender_key, recipient, channel, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    sender,
                    normalize_nick(sender),
                    recipient,
                    channel,
                    message,
                    created_at
                ],
            )?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(TellOutcome::Queued(id))
        })
    }

    /// Undelivered messages for `recipient` in `channel`, oldest first.
    pub fn pending_tells(&self, recipient: &str, channel: &str) -> Result<Vec<TellRow>> {
        self.with_conn(|conn| query_pending_tells(conn, recipient, channel))
    }

    /// Flip a message to delivered. Returns false if it was already delivered
    /// (or does not exist), so a row is only ever handed over once.
    pub fn mark_tell_delivered(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tell_messages SET delivered = 1 WHERE id = ?1 AND delivered = 0",
                [id],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn get_tell(&self, id: i64) -> Result<Option<TellRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, sender, recipient, channel, message, created_at, delivered
                     FROM tell_messages WHERE id = ?1",
                    [id],
                    tell_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Health --

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

fn query_last_seen(conn: &Connection, nickname: &str, channel: &str) -> Result<Option<ActivityRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, nickname, channel, last_message, last_seen
         FROM user_activity
         WHERE nickname = ?1 AND channel = ?2
         ORDER BY last_seen DESC
         LIMIT 1",
    )?;

    let row = stmt
        .query_row([nickname, channel], |row| {
            Ok(ActivityRow {
                id: row.get(0)?,
                nickname: row.get(1)?,
                channel: row.get(2)?,
                last_message: row.get(3)?,
                last_seen: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn count_pending(conn: &Connection, sender: &str, recipient: &str, channel: &str) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM tell_messages
         WHERE sender_key = ?1 AND recipient = ?2 AND channel = ?3 AND delivered = 0",
        [normalize_nick(sender).as_str(), recipient, channel],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn query_pending_tells(conn: &Connection, recipient: &str, channel: &str) -> Result<Vec<TellRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, sender, recipient, channel, message, created_at, delivered
         FROM tell_messages
         WHERE recipient = ?1 AND channel = ?2 AND delivered = 0
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map([recipient, channel], tell_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn tell_from_row(row: &Row<'_>) -> rusqlite::Result<TellRow> {
    Ok(TellRow {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        channel: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
        delivered: row.get(6)?,
    })
}
