//! Database row types. These map directly to SQLite rows.

use chrono::{DateTime, Utc};

/// Most recent line a nickname posted in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRow {
    pub id: i64,
    /// Lowercased.
    pub nickname: String,
    pub channel: String,
    pub last_message: String,
    pub last_seen: DateTime<Utc>,
}

/// A message left with `tell`, waiting for (or already handed to) its
/// recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TellRow {
    pub id: i64,
    pub sender: String,
    /// Lowercased.
    pub recipient: String,
    pub channel: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub delivered: bool,
}
