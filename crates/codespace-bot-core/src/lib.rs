//! Core abstractions for the codespace bot.
//!
//! This crate provides the fundamental building blocks:
//! - `CredentialRecord`, `Codespace`, `ToggleAction` - Domain types
//! - `InboundEvent` / `OutboundAction` - Transport-neutral event model
//! - Storage, remote API and handler traits

pub mod event;
pub mod traits;
pub mod types;

pub use event::{Button, ButtonTarget, Callback, EventKind, InboundEvent, Keyboard, OutboundAction, Sender};
pub use traits::{CredentialStorage, EnvironmentApi, EventHandler, StorageError};
pub use types::{ChatId, Codespace, CredentialRecord, ToggleAction};
