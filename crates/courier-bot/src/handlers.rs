use chrono::{DateTime, Utc};
use tracing::warn;

use courier_db::TellOutcome;
use courier_types::events::normalize_nick;

use crate::commands::Command;
use crate::router::Bot;

/// Undelivered messages one sender may leave for one recipient per channel.
pub const TELL_QUOTA: u32 = 5;

pub const GENERIC_ERROR: &str = "Something went wrong, try again later.";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl Bot {
    /// Run `command` and return the line to post back to the channel.
    pub async fn dispatch(
        &self,
        command: Command,
        sender: &str,
        channel: &str,
        args: &[String],
    ) -> String {
        match command {
            Command::Echo => self.echo(sender, args),
            Command::Help => self.help(),
            Command::Seen => self.seen(channel, args).await,
            Command::Tell => self.tell(sender, channel, args).await,
            Command::Test => self.test().await,
        }
    }

    fn usage(&self, command: Command, params: &str) -> String {
        format!("Usage: {}{} {}", self.settings.prefix, command, params)
    }

    fn echo(&self, sender: &str, args: &[String]) -> String {
        if args.is_empty() {
            return self.usage(Command::Echo, "<message>");
        }
        format!("{} said: {}", sender, args.join(" "))
    }

    fn help(&self) -> String {
        let names: Vec<String> = self
            .registry
            .commands()
            .iter()
            .map(|c| format!("{}{}", self.settings.prefix, c))
            .collect();
        format!("Available commands: {}", names.join(", "))
    }

    async fn seen(&self, channel: &str, args: &[String]) -> String {
        let Some(nick) = args.first() else {
            return self.usage(Command::Seen, "<nick>");
        };

        let (n, c) = (normalize_nick(nick), channel.to_string());
        match self.blocking(move |db| db.last_seen(&n, &c)).await {
            Ok(Some(row)) => format!(
                "{} was last seen {} saying: \"{}\"",
                nick,
                format_timestamp(row.last_seen),
                row.last_message
            ),
            Ok(None) => format!("I haven't seen {} around.", nick),
            Err(e) => {
                warn!("seen lookup for {} in {} failed: {}", nick, channel, e);
                GENERIC_ERROR.to_string()
            }
        }
    }

    async fn tell(&self, sender: &str, channel: &str, args: &[String]) -> String {
        let [nick, words @ ..] = args else {
            return self.usage(Command::Tell, "<nick> <message>");
        };
        if words.is_empty() {
            return self.usage(Command::Tell, "<nick> <message>");
        }

        let (s, r, c) = (sender.to_string(), normalize_nick(nick), channel.to_string());
        let message = words.join(" ");
        let now = Utc::now();

        match self
            .blocking(move |db| db.queue_tell(&s, &r, &c, &message, now, TELL_QUOTA))
            .await
        {
            Ok(TellOutcome::Queued(_)) => {
                format!("{}: I'll pass that on when {} is around.", sender, nick)
            }
            Ok(TellOutcome::QuotaReached) => format!(
                "{}: {} already has {} messages waiting from you.",
                sender, nick, TELL_QUOTA
            ),
            Err(e) => {
                warn!("tell from {} to {} in {} failed: {}", sender, nick, channel, e);
                GENERIC_ERROR.to_string()
            }
        }
    }

    async fn test(&self) -> String {
        match self.blocking(|db| db.ping()).await {
            Ok(()) => "SQLite connected!".to_string(),
            Err(e) => {
                warn!("Storage ping failed: {}", e);
                GENERIC_ERROR.to_string()
            }
        }
    }
}
