use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use courier_db::Database;
use courier_types::events::{InboundEvent, normalize_nick};

use crate::commands::{CommandRegistry, parse_invocation};
use crate::handlers::format_timestamp;
use crate::outbox::Outbox;

/// Per-deployment knobs for the router.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Character that marks a line as a command.
    pub prefix: char,
    /// Answer with our own nick when someone mentions it.
    pub mention_reply: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefix: '.',
            mention_reply: false,
        }
    }
}

/// Routes inbound chat events: records activity, hands over waiting mail and
/// dispatches prefixed commands.
pub struct Bot {
    pub(crate) db: Arc<Database>,
    pub(crate) registry: CommandRegistry,
    pub(crate) settings: BotSettings,
    pub(crate) outbox: Outbox,
    /// Current nickname, kept up to date by the transport.
    nick: watch::Receiver<String>,
}

impl Bot {
    pub fn new(
        db: Arc<Database>,
        registry: CommandRegistry,
        settings: BotSettings,
        outbox: Outbox,
        nick: watch::Receiver<String>,
    ) -> Self {
        Self {
            db,
            registry,
            settings,
            outbox,
            nick,
        }
    }

    /// Consume events one at a time until every sender is gone.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<InboundEvent>) {
        info!(
            "Event router started (prefix '{}', commands: {:?})",
            self.settings.prefix,
            self.registry.commands()
        );

        while let Some(event) = events.recv().await {
            self.handle_event(&event).await;
        }

        info!("Inbound stream closed, event router stopping");
    }

    /// Process a single event to completion. Failures are logged and never
    /// escape; the next event is unaffected.
    pub async fn handle_event(&self, event: &InboundEvent) {
        if !event.is_channel() {
            trace!("Ignoring private message from {}", event.sender);
            return;
        }

        let own_nick = self.nick.borrow().clone();
        if event.sender.eq_ignore_ascii_case(&own_nick) {
            return;
        }

        let nickname = normalize_nick(&event.sender);
        let channel = event.target.as_str();

        self.record_activity(&nickname, channel, &event.text).await;
        self.deliver_pending(&event.sender, &nickname, channel).await;

        if self.settings.mention_reply
            && !own_nick.is_empty()
            && event.text.to_lowercase().contains(&own_nick.to_lowercase())
        {
            self.outbox.send(channel, own_nick.as_str());
        }

        let Some(invocation) = parse_invocation(&event.text, self.settings.prefix) else {
            return;
        };

        let Some(command) = self.registry.lookup(&invocation.name) else {
            debug!("Unrecognized command '{}' from {}", invocation.name, event.sender);
            return;
        };

        debug!("{} ran {} in {}", event.sender, command, channel);
        let reply = self
            .dispatch(command, &event.sender, channel, &invocation.args)
            .await;
        self.outbox.send(channel, reply);
    }

    async fn record_activity(&self, nickname: &str, channel: &str, text: &str) {
        let (n, c, t) = (nickname.to_string(), channel.to_string(), text.to_string());
        let now = Utc::now();

        if let Err(e) = self
            .blocking(move |db| db.record_activity(&n, &c, &t, now))
            .await
        {
            warn!("Failed to record activity for {} in {}: {}", nickname, channel, e);
        }
    }

    /// Hand over everything waiting for `nickname` in `channel`, oldest
    /// first. Each row is announced then marked on its own, so one failure
    /// does not hold back the rest.
    async fn deliver_pending(&self, spoken_nick: &str, nickname: &str, channel: &str) {
        let (n, c) = (nickname.to_string(), channel.to_string());
        let pending = match self.blocking(move |db| db.pending_tells(&n, &c)).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Failed to load mailbox for {} in {}: {}", nickname, channel, e);
                return;
            }
        };

        for tell in pending {
            self.outbox.send(
                channel,
                format!(
                    "{}: \"{}\" ~ {} [{}]",
                    spoken_nick,
                    tell.message,
                    tell.sender,
                    format_timestamp(tell.created_at)
                ),
            );

            let id = tell.id;
            match self.blocking(move |db| db.mark_tell_delivered(id)).await {
                Ok(true) => debug!("Delivered tell {} to {} in {}", id, nickname, channel),
                Ok(false) => debug!("Tell {} was already delivered", id),
                Err(e) => warn!("Failed to mark tell {} delivered: {}", id, e),
            }
        }
    }

    /// Run a storage call on the blocking pool.
    pub(crate) async fn blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        match tokio::task::spawn_blocking(move || f(&db)).await {
            Ok(result) => result,
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                Err(anyhow!("storage task failed: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::events::OutboundMessage;

    struct Harness {
        bot: Bot,
        db: Arc<Database>,
        out: mpsc::UnboundedReceiver<OutboundMessage>,
        _nick: watch::Sender<String>,
    }

    fn harness(settings: BotSettings) -> Harness {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (outbox, out) = Outbox::channel();
        let (nick_tx, nick_rx) = watch::channel("courier".to_string());
        let bot = Bot::new(db.clone(), CommandRegistry::default(), settings, outbox, nick_rx);
        Harness {
            bot,
            db,
            out,
            _nick: nick_tx,
        }
    }

    fn drain(out: &mut mpsc::UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut sent = Vec::new();
        while let Ok(msg) = out.try_recv() {
            sent.push(msg);
        }
        sent
    }

    #[tokio::test]
    async fn records_lowercased_activity() {
        let mut h = harness(BotSettings::default());
        h.bot
            .handle_event(&InboundEvent::new("Alice", "#test", "good morning"))
            .await;

        let row = h.db.last_seen("alice", "#test").unwrap().unwrap();
        assert_eq!(row.nickname, "alice");
        assert_eq!(row.last_message, "good morning");
        assert!(drain(&mut h.out).is_empty());
    }

    #[tokio::test]
    async fn private_messages_are_ignored() {
        let mut h = harness(BotSettings::default());
        h.bot
            .handle_event(&InboundEvent::new("alice", "courier", ".echo hi"))
            .await;

        assert!(h.db.last_seen("alice", "courier").unwrap().is_none());
        assert!(drain(&mut h.out).is_empty());
    }

    #[tokio::test]
    async fn own_messages_are_dropped() {
        let mut h = harness(BotSettings {
            mention_reply: true,
            ..BotSettings::default()
        });
        h.bot
            .handle_event(&InboundEvent::new("Courier", "#test", ".echo courier loop"))
            .await;

        assert!(h.db.last_seen("courier", "#test").unwrap().is_none());
        assert!(drain(&mut h.out).is_empty());
    }

    #[tokio::test]
    async fn nick_changes_are_followed() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (outbox, mut out) = Outbox::channel();
        let (nick_tx, nick_rx) = watch::channel("courier".to_string());
        let bot = Bot::new(db, CommandRegistry::default(), BotSettings::default(), outbox, nick_rx);

        nick_tx.send("courier_".to_string()).unwrap();
        bot.handle_event(&InboundEvent::new("courier_", "#test", ".echo hi"))
            .await;
        assert!(drain(&mut out).is_empty());

        // The old nick now belongs to someone else.
        bot.handle_event(&InboundEvent::new("courier", "#test", ".echo hi"))
            .await;
        assert_eq!(drain(&mut out), vec![OutboundMessage::new("#test", "courier said: hi")]);
    }

    #[tokio::test]
    async fn mention_reply_when_enabled() {
        let mut h = harness(BotSettings {
            mention_reply: true,
            ..BotSettings::default()
        });
        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", "hey COURIER, you there?"))
            .await;
        assert_eq!(drain(&mut h.out), vec![OutboundMessage::new("#test", "courier")]);

        let mut h = harness(BotSettings::default());
        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", "hey courier"))
            .await;
        assert!(drain(&mut h.out).is_empty());
    }

    #[tokio::test]
    async fn unknown_and_disabled_commands_are_silent() {
        let mut h = harness(BotSettings::default());
        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", ".dance"))
            .await;
        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", ".test"))
            .await;
        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", ".   "))
            .await;
        assert!(drain(&mut h.out).is_empty());
    }

    #[tokio::test]
    async fn custom_prefix() {
        let mut h = harness(BotSettings {
            prefix: '!',
            ..BotSettings::default()
        });
        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", ".echo nope"))
            .await;
        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", "!ECHO yes"))
            .await;
        assert_eq!(drain(&mut h.out), vec![OutboundMessage::new("#test", "alice said: yes")]);
    }

    #[tokio::test]
    async fn activity_failure_does_not_stop_dispatch() {
        let mut h = harness(BotSettings::default());
        h.db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE user_activity")?))
            .unwrap();

        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", ".echo still works"))
            .await;
        assert_eq!(
            drain(&mut h.out),
            vec![OutboundMessage::new("#test", "alice said: still works")]
        );
    }

    #[tokio::test]
    async fn mailbox_failure_does_not_stop_dispatch() {
        let mut h = harness(BotSettings::default());
        h.db.with_conn(|conn| Ok(conn.execute_batch("DROP TABLE tell_messages")?))
            .unwrap();

        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", ".echo ok"))
            .await;
        assert_eq!(drain(&mut h.out), vec![OutboundMessage::new("#test", "alice said: ok")]);
    }

    #[tokio::test]
    async fn delivery_comes_before_command_reply() {
        let mut h = harness(BotSettings::default());
        h.db.queue_tell("carol", "alice", "#test", "ping me", Utc::now(), 5)
            .unwrap();

        h.bot
            .handle_event(&InboundEvent::new("Alice", "#test", ".echo back"))
            .await;

        let sent = drain(&mut h.out);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.starts_with("Alice: \"ping me\" ~ carol ["));
        assert_eq!(sent[1].text, "Alice said: back");
    }

    #[tokio::test]
    async fn one_stuck_delivery_does_not_block_the_rest() {
        let mut h = harness(BotSettings::default());
        let now = Utc::now();
        let mut ids = Vec::new();
        for text in ["first", "second", "third"] {
            match h.db.queue_tell("carol", "alice", "#test", text, now, 5).unwrap() {
                courier_db::TellOutcome::Queued(id) => ids.push(id),
                courier_db::TellOutcome::QuotaReached => panic!("unexpected quota"),
            }
        }

        let stuck = ids[1];
        h.db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TRIGGER refuse_delivery BEFORE UPDATE ON tell_messages
                 WHEN OLD.id = {stuck}
                 BEGIN SELECT RAISE(ABORT, 'refused'); END;"
            ))?;
            Ok(())
        })
        .unwrap();

        h.bot
            .handle_event(&InboundEvent::new("alice", "#test", "hello"))
            .await;

        let sent = drain(&mut h.out);
        assert_eq!(sent.len(), 3);
        assert!(sent[0].text.starts_with("alice: \"first\""));
        assert!(sent[1].text.starts_with("alice: \"second\""));
        assert!(sent[2].text.starts_with("alice: \"third\""));

        let pending: Vec<_> = h
            .db
            .pending_tells("alice", "#test")
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(pending, vec![stuck]);
    }

    #[tokio::test]
    async fn run_processes_in_order_until_closed() {
        let Harness { bot, mut out, _nick, .. } = harness(BotSettings::default());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(InboundEvent::new("alice", "#test", ".echo one")).unwrap();
        tx.send(InboundEvent::new("bob", "#test", ".echo two")).unwrap();
        drop(tx);

        bot.run(rx).await;

        let texts: Vec<_> = drain(&mut out).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["alice said: one", "bob said: two"]);
    }
}
