/// A line of chat observed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Nickname of the sender, as the server reported it.
    pub sender: String,
    /// Channel name, or the bot's own nick for a private message.
    pub target: String,
    pub text: String,
}

impl InboundEvent {
    pub fn new(sender: impl Into<String>, target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            target: target.into(),
            text: text.into(),
        }
    }

    /// True when the event was posted to a multi-party channel rather than
    /// sent privately.
    pub fn is_channel(&self) -> bool {
        is_channel_name(&self.target)
    }
}

/// Text the bot wants delivered to a channel or a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub target: String,
    pub text: String,
}

impl OutboundMessage {
    pub fn new(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            text: text.into(),
        }
    }
}

/// Channel names start with `#` or `&`; anything else is a direct target.
pub fn is_channel_name(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

/// Nicknames are stored and compared lowercased.
pub fn normalize_nick(nick: &str) -> String {
    nick.to_lowercase()
}
