use anyhow::{Context, Result, bail};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use courier_types::events::{InboundEvent, OutboundMessage};

use super::codec::IrcCodec;
use super::message::Message;

/// How many times a taken nick is retried with a `_` suffix before giving up.
const MAX_NICK_RETRIES: u32 = 5;

/// RFC 2812 line limit without the trailing CRLF.
const MAX_LINE_BYTES: usize = 510;

/// Room left for the `:nick!user@host ` the server prepends when relaying.
const SOURCE_ALLOWANCE: usize = 100;

#[derive(Debug, Clone)]
pub struct IrcConfig {
    /// `host:port`
    pub server: String,
    pub nick: String,
    pub ident: String,
    pub realname: String,
    pub channels: Vec<String>,
}

/// Connection state that outlives individual lines: the nick we currently
/// hold and the channels that carry events to the router.
pub struct Session<'a> {
    config: &'a IrcConfig,
    nick: String,
    nick_retries: u32,
    events: mpsc::UnboundedSender<InboundEvent>,
    nick_tx: watch::Sender<String>,
}

impl<'a> Session<'a> {
    pub fn new(
        config: &'a IrcConfig,
        events: mpsc::UnboundedSender<InboundEvent>,
        nick_tx: watch::Sender<String>,
    ) -> Self {
        Self {
            config,
            nick: config.nick.clone(),
            nick_retries: 0,
            events,
            nick_tx,
        }
    }

    pub fn register(&self) -> Vec<Message> {
        vec![
            Message::new("NICK", [self.nick.as_str()]),
            Message::new(
                "USER",
                [self.config.ident.as_str(), "0", "*", self.config.realname.as_str()],
            ),
        ]
    }

    /// React to one server line. Returns the lines to write back.
    pub fn handle(&mut self, msg: &Message) -> Result<Vec<Message>> {
        let replies = match msg.command.as_str() {
            "PING" => vec![Message::new("PONG", msg.params.clone())],
            "001" => {
                if let Some(accepted) = msg.params.first() {
                    self.set_nick(accepted.clone());
                }
                info!("Registered as {}, joining {}", self.nick, self.config.channels.join(","));
                vec![Message::new("JOIN", [self.config.channels.join(",")])]
            }
            "433" => {
                if self.nick_retries >= MAX_NICK_RETRIES {
                    bail!("no free nickname after {} attempts, last tried {}", MAX_NICK_RETRIES, self.nick);
                }
                self.nick_retries += 1;
                self.nick.push('_');
                warn!("Nickname in use, retrying as {}", self.nick);
                vec![Message::new("NICK", [self.nick.as_str()])]
            }
            "NICK" => {
                if let (Some(old), Some(new)) = (msg.source_nick(), msg.params.first()) {
                    if old.eq_ignore_ascii_case(&self.nick) {
                        self.set_nick(new.clone());
                    }
                }
                vec![]
            }
            "PRIVMSG" => {
                if let (Some(sender), [target, text, ..]) = (msg.source_nick(), msg.params.as_slice()) {
                    let event = InboundEvent::new(sender, target.as_str(), text.as_str());
                    if self.events.send(event).is_err() {
                        warn!("Router is gone, dropping message from {}", sender);
                    }
                }
                vec![]
            }
            "ERROR" => {
                warn!("Server error: {}", msg.params.join(" "));
                vec![]
            }
            _ => vec![],
        };
        Ok(replies)
    }

    fn set_nick(&mut self, nick: String) {
        debug!("Now known as {}", nick);
        self.nick = nick.clone();
        self.nick_tx.send_replace(nick);
    }
}

/// Outbound text becomes one PRIVMSG per non-empty line, with long lines
/// split so the relayed form stays within the protocol line limit.
pub fn outbound_lines(out: &OutboundMessage) -> Vec<Message> {
    let overhead = "PRIVMSG ".len() + out.target.len() + " :".len() + SOURCE_ALLOWANCE;
    let budget = MAX_LINE_BYTES.saturating_sub(overhead).max(1);

    out.text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| split_to_fit(line, budget))
        .map(|chunk| Message::privmsg(&out.target, chunk))
        .collect()
}

/// Break `line` into pieces of at most `budget` bytes, preferring to cut at
/// whitespace and never inside a UTF-8 sequence.
fn split_to_fit(line: &str, budget: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = line;

    while rest.len() > budget {
        let mut cut = budget;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            // A single character wider than the budget.
            cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
        } else if let Some(space) = rest[..cut].rfind(char::is_whitespace) {
            if space > 0 {
                cut = space;
            }
        }

        let piece = rest[..cut].trim_end();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest);
    }
    pieces
}

/// Connect, register, and pump lines until the server hangs up.
pub async fn run(
    config: &IrcConfig,
    events: mpsc::UnboundedSender<InboundEvent>,
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    nick_tx: watch::Sender<String>,
) -> Result<()> {
    let stream = TcpStream::connect(&config.server)
        .await
        .with_context(|| format!("connecting to {}", config.server))?;
    info!("Connected to {}", config.server);

    let mut framed = Framed::new(stream, IrcCodec);
    let mut session = Session::new(config, events, nick_tx);

    for msg in session.register() {
        framed.send(msg).await?;
    }

    loop {
        tokio::select! {
            frame = framed.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => return Err(e).context("reading from server"),
                    None => bail!("{} closed the connection", config.server),
                };
                for reply in session.handle(&msg)? {
                    framed.send(reply).await?;
                }
            }
            Some(out) = outbound.recv() => {
                for msg in outbound_lines(&out) {
                    framed.send(msg).await?;
                }
            }
        }
    }
}
