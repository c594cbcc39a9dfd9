//! Session synchronization and storage for collaborative code sessions.
//!
//! Provides:
//! - `SessionSynchronizer` - Reconcile a local buffer with a stored session
//! - `ViewState` / `SaveStatus` - What an editor surface renders
//! - Storage implementations (memory, SQLite)

pub mod storage;
pub mod synchronizer;
pub mod view;

pub use synchronizer::{ActiveSession, SessionSynchronizer, SyncError};
pub use view::{ChangeOrigin, SaveStatus, ViewState};
