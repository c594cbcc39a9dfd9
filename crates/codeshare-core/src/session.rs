//! Session data model.

use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum accepted length of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Session identifier error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSessionId {
    #[error("Session id is empty")]
    Empty,
    #[error("Session id exceeds {} characters", MAX_SESSION_ID_LEN)]
    TooLong,
    #[error("Session id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Opaque, routable session identifier.
///
/// Minted client-side; doubles as the store's primary key and the
/// `/session/{id}` path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh random identifier (UUID v4).
    #[must_use]
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse and validate an identifier.
    ///
    /// # Errors
    /// Returns error if the id is empty, too long, or contains characters
    /// outside `[A-Za-z0-9_-]`.
    pub fn parse(s: &str) -> Result<Self, InvalidSessionId> {
        if s.is_empty() {
            return Err(InvalidSessionId::Empty);
        }
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(InvalidSessionId::TooLong);
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(InvalidSessionId::InvalidChar(c));
        }
        Ok(Self(s.to_string()))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = InvalidSessionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = InvalidSessionId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Unknown language error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown language: {0}")]
pub struct UnknownLanguage(pub String);

/// Supported syntax-highlighting languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Javascript,
    Typescript,
    Python,
    Java,
    Html,
    Css,
    Json,
}

impl Language {
    /// Every supported language, in selector order.
    pub const ALL: [Self; 7] = [
        Self::Javascript,
        Self::Typescript,
        Self::Python,
        Self::Java,
        Self::Html,
        Self::Css,
        Self::Json,
    ];

    /// Wire/storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Javascript => "javascript",
            Self::Typescript => "typescript",
            Self::Python => "python",
            Self::Java => "java",
            Self::Html => "html",
            Self::Css => "css",
            Self::Json => "json",
        }
    }

    /// Human-readable name for selectors.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Javascript => "JavaScript",
            Self::Typescript => "TypeScript",
            Self::Python => "Python",
            Self::Java => "Java",
            Self::Html => "HTML",
            Self::Css => "CSS",
            Self::Json => "JSON",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

/// Persisted session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Primary key.
    pub id: SessionId,
    /// Shared text buffer.
    pub content: String,
    /// Highlighting language.
    pub language: Language,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

impl SessionRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn new(id: SessionId, content: impl Into<String>, language: Language) -> Self {
        let timestamp = now();
        Self {
            id,
            content: content.into(),
            language,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Apply a partial update in place. Returns true if any field was present.
    pub fn apply(&mut self, patch: &SessionPatch) -> bool {
        if patch.is_empty() {
            return false;
        }
        if let Some(content) = &patch.content {
            self.content.clone_from(content);
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        self.updated_at = now();
        true
    }
}

/// Partial update of a session's fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
}

impl SessionPatch {
    /// Patch that only replaces the content.
    #[must_use]
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            language: None,
        }
    }

    /// Patch that only replaces the language.
    #[must_use]
    pub const fn language(language: Language) -> Self {
        Self {
            content: None,
            language: Some(language),
        }
    }

    /// True if the patch carries no fields.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.content.is_none() && self.language.is_none()
    }
}

/// Kind of change reported by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
}

/// Change notification for one session.
///
/// Fields are `None` when the event only carries the changed subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub id: SessionId,
    pub kind: ChangeKind,
    pub content: Option<String>,
    pub language: Option<Language>,
}

impl SessionEvent {
    /// Event carrying the full record state.
    #[must_use]
    pub fn from_record(kind: ChangeKind, record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind,
            content: Some(record.content.clone()),
            language: Some(record.language),
        }
    }
}

/// Current Unix time in seconds.
#[must_use]
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
