//! Core abstractions for collaborative code-session synchronization.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionId`, `Language`, `SessionRecord` - The session data model
//! - `SessionStore` - Capability trait for the remote session store
//! - `Subscription` - Cancellable change-notification handle
//! - `ChangeFeed` - Broadcast fan-out for store backends
//! - `Route` - Path to session mapping
//! - `SyncConfig` - Synchronizer configuration

pub mod change_feed;
pub mod config;
pub mod route;
pub mod session;
pub mod traits;

pub use change_feed::ChangeFeed;
pub use config::{ConfigError, SyncConfig};
pub use route::Route;
pub use session::{ChangeKind, Language, SessionEvent, SessionId, SessionPatch, SessionRecord};
pub use traits::{
    Clipboard, ClipboardError, SessionStore, StoreError, Subscription, SubscriptionError,
};
