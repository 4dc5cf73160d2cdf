//! Chat transport for the codespace bot.
//!
//! Provides:
//! - Callback wire protocol and command parsing
//! - `Poller` - long-poll loop with fixed-backoff restart
//! - Telegram transport (feature: telegram)

pub mod poller;
pub mod protocol;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use poller::{ActionSink, EventSource, Poller, TransportError};
pub use protocol::{AuditChannel, decode_callback, encode_callback, parse_command};
