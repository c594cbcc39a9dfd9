//! Wire protocol for client-server communication.

use codeshare_core::Language;
use codeshare_session::SaveStatus;
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter a session, leaving any current one.
    Join { session_id: String },
    /// Editor content changed.
    Edit { content: String },
    /// Language selector changed.
    SetLanguage { language: Language },
    /// The browser copied the share link to its clipboard.
    LinkCopied,
    /// Leave the current session.
    Leave,
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session entered; initial state.
    Joined {
        session_id: String,
        content: String,
        language: Language,
    },
    /// Content changed by another client.
    Content { content: String },
    /// Language changed by another client.
    Language { language: Language },
    /// Status slot changed.
    Status { state: SaveStatus, message: String },
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Status message for a save state.
    #[must_use]
    pub fn status(state: SaveStatus) -> Self {
        Self::Status {
            state,
            message: state.message().to_string(),
        }
    }
}
