//! Local view state rendered by an editor surface.

use std::fmt;

use codeshare_core::Language;
use serde::{Deserialize, Serialize};

/// Status slot shown next to the editor.
///
/// Save progress and "link copied" share the slot; the latest write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Nothing to report.
    #[default]
    Idle,
    /// A content write is in flight.
    Saving,
    /// The last content write succeeded.
    Saved,
    /// The last content write failed.
    ErrorSaving,
    /// The session record could not be created.
    ErrorCreating,
    /// The share link was copied to the clipboard.
    LinkCopied,
}

impl SaveStatus {
    /// Text displayed in the status slot.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Saving => "Saving...",
            Self::Saved => "Saved",
            Self::ErrorSaving => "Error saving",
            Self::ErrorCreating => "Error creating session",
            Self::LinkCopied => "Link copied!",
        }
    }

    /// True for failure states.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::ErrorSaving | Self::ErrorCreating)
    }
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Who made the most recent change to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Defaults or the record adopted on entry.
    #[default]
    Initial,
    /// This client's editor surface.
    Local,
    /// Another client, via the change subscription.
    Remote,
}

/// Locally held session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    pub content: String,
    pub language: Language,
    pub status: SaveStatus,
    /// Source of the current `content`.
    pub content_origin: ChangeOrigin,
    /// Source of the current `language`.
    pub language_origin: ChangeOrigin,
}

impl ViewState {
    #[must_use]
    pub fn new(content: impl Into<String>, language: Language) -> Self {
        Self {
            content: content.into(),
            language,
            status: SaveStatus::Idle,
            content_origin: ChangeOrigin::Initial,
            language_origin: ChangeOrigin::Initial,
        }
    }

    /// Apply incoming field values, skipping any that already match.
    ///
    /// Returns true if anything changed.
    pub fn merge_fields(
        &mut self,
        content: Option<String>,
        language: Option<Language>,
        origin: ChangeOrigin,
    ) -> bool {
        let mut changed = false;
        if let Some(content) = content {
            if self.content != content {
                self.content = content;
                self.content_origin = origin;
                changed = true;
            }
        }
        if let Some(language) = language {
            if self.language != language {
                self.language = language;
                self.language_origin = origin;
                changed = true;
            }
        }
        changed
    }
}
