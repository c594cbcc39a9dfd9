//! Core traits for session storage and client side effects.

use std::fmt;

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use thiserror::Error;

use crate::session::{Language, SessionEvent, SessionId, SessionPatch, SessionRecord};

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(SessionId),
    #[error("Session already exists: {0}")]
    AlreadyExists(SessionId),
    #[error("Corrupt session record {id}: {reason}")]
    Corrupt { id: SessionId, reason: String },
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Subscription error.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    #[error("Subscription lagged, {0} events dropped")]
    Lagged(u64),
    #[error("Subscription transport error: {0}")]
    Transport(String),
}

/// Stream of change events delivered to a subscription.
pub type EventStream = BoxStream<'static, Result<SessionEvent, SubscriptionError>>;

type CloseHook = Box<dyn FnOnce() + Send>;

/// Cancellable change subscription scoped to one session.
///
/// `close` is idempotent: the close hook runs exactly once, either on the
/// first explicit `close` or on drop, whichever comes first.
pub struct Subscription {
    id: SessionId,
    events: EventStream,
    on_close: Option<CloseHook>,
    closed: bool,
}

impl Subscription {
    /// Wrap an event stream.
    #[must_use]
    pub fn new(id: SessionId, events: EventStream) -> Self {
        Self {
            id,
            events,
            on_close: None,
            closed: false,
        }
    }

    /// Attach a hook that runs when the subscription is closed.
    #[must_use]
    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Session this subscription is scoped to.
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// True once `close` has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Wait for the next event. Yields `None` once closed or exhausted.
    pub async fn next_event(&mut self) -> Option<Result<SessionEvent, SubscriptionError>> {
        if self.closed {
            return None;
        }
        self.events.next().await
    }

    /// Unsubscribe. Safe to call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // Drops the underlying receiver.
        self.events = futures::stream::empty().boxed();
        if let Some(hook) = self.on_close.take() {
            hook();
        }
        tracing::debug!("Subscription for session {} closed", self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Trait for session store backends.
///
/// Concurrent writers to the same id are resolved last-write-wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Get a session by ID. `Ok(None)` if no record exists.
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert a new session.
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn insert(
        &self,
        id: &SessionId,
        content: &str,
        language: Language,
    ) -> Result<SessionRecord, StoreError>;

    /// Apply a partial update. An empty patch is a no-op.
    async fn update(&self, id: &SessionId, patch: SessionPatch) -> Result<(), StoreError>;

    /// Subscribe to update events for one session.
    async fn subscribe(&self, id: &SessionId) -> Result<Subscription, StoreError>;
}

/// Clipboard error.
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("Clipboard unavailable")]
    Unavailable,
    #[error("Clipboard write failed: {0}")]
    WriteFailed(String),
}

/// Client clipboard used by "share".
pub trait Clipboard: Send + Sync {
    /// Replace the clipboard contents.
    ///
    /// # Errors
    /// Returns error if the clipboard cannot be written.
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}
