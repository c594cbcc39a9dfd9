//! In-memory session store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use codeshare_core::{
    ChangeFeed,
    session::{ChangeKind, Language, SessionEvent, SessionId, SessionPatch, SessionRecord},
    traits::{SessionStore, StoreError, Subscription},
};

/// In-memory store implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            feed: ChangeFeed::new(),
        }
    }

    /// Create a store whose change feed buffers at most `capacity` events
    /// per subscriber.
    #[must_use]
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            feed: ChangeFeed::with_capacity(capacity),
        }
    }

    /// Number of stored sessions.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .len())
    }

    /// True if no sessions are stored.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Change feed backing subscriptions.
    #[must_use]
    pub const fn feed(&self) -> &ChangeFeed {
        &self.feed
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self
            .sessions
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(id)
            .cloned())
    }

    async fn insert(
        &self,
        id: &SessionId,
        content: &str,
        language: Language,
    ) -> Result<SessionRecord, StoreError> {
        let record = SessionRecord::new(id.clone(), content, language);
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        if sessions.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        sessions.insert(id.clone(), record.clone());
        self.feed
            .publish(SessionEvent::from_record(ChangeKind::Inserted, &record));
        Ok(record)
    }

    async fn update(&self, id: &SessionId, patch: SessionPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let record = sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        record.apply(&patch);
        // Published under the lock so feed order matches commit order.
        self.feed
            .publish(SessionEvent::from_record(ChangeKind::Updated, record));
        Ok(())
    }

    async fn subscribe(&self, id: &SessionId) -> Result<Subscription, StoreError> {
        Ok(self.feed.subscribe(id))
    }
}
