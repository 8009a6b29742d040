//! Event routing, command dispatch and the tell mailbox.
//!
//! The transport feeds [`courier_types::events::InboundEvent`]s into
//! [`router::Bot::run`]; everything the bot wants said comes back out of the
//! [`outbox::Outbox`] receiver.

pub mod commands;
pub mod handlers;
pub mod outbox;
pub mod router;

pub use commands::{Command, CommandError, CommandRegistry};
pub use outbox::Outbox;
pub use router::{Bot, BotSettings};
