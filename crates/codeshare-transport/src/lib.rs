//! Real-time transport and web front-end for code sessions.
//!
//! Provides:
//! - Wire protocol (JSON)
//! - Per-socket connection driver bridging clients to `ActiveSession`s
//! - WebSocket transport and HTTP routes (feature: websocket)
//! - Landing and editor pages (feature: websocket)

pub mod connection;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod pages;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use connection::{Connection, SendError};
pub use protocol::{ClientMessage, ServerMessage};
