//! Credential storage, selection state and interaction routing.
//!
//! Provides:
//! - `CredentialStore` - best-effort facade over a storage backend
//! - `SessionStore` - per-chat state and selection
//! - `Router` - the interaction state machine
//! - Storage implementations (memory, SQLite)

pub mod router;
pub mod selection;
pub mod storage;
pub mod store;

pub use router::{FreeTextPolicy, Router};
pub use selection::{ChatState, SessionStore};
pub use store::{CredentialStore, TokenLoad};
