use tokio::sync::mpsc;
use tracing::warn;

use courier_types::events::OutboundMessage;

/// Fire-and-forget sink for outgoing text. The transport owns the receiving
/// end; the bot never waits for a send to be acknowledged.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// Create an outbox together with the receiver the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn send(&self, target: &str, text: impl Into<String>) {
        if self.tx.send(OutboundMessage::new(target, text)).is_err() {
            warn!("Outbound queue closed, dropping message to {}", target);
        }
    }
}
