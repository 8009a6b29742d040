mod config;
mod irc;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use courier_bot::{Bot, Outbox};
use courier_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,courier_db=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (outbox, outbound_rx) = Outbox::channel();
    let (nick_tx, nick_rx) = watch::channel(config.irc.nick.clone());

    let bot = Bot::new(db, config.registry.clone(), config.settings.clone(), outbox, nick_rx);
    let router = tokio::spawn(bot.run(event_rx));

    info!("Courier connecting to {} as {}", config.irc.server, config.irc.nick);
    let result = irc::client::run(&config.irc, event_tx, outbound_rx, nick_tx).await;

    // The transport owned the only event sender, so the router drains and exits.
    if let Err(e) = router.await {
        error!("Event router task failed: {}", e);
    }

    result
}
