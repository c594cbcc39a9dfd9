//! Broadcast change feed for store backends.

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::{
    session::{ChangeKind, SessionEvent, SessionId},
    traits::{Subscription, SubscriptionError},
};

/// Default broadcast buffer size.
const CHANNEL_CAPACITY: usize = 1024;

/// Fan-out hub for session change events.
///
/// Backends publish every insert/update here; each subscription sees only
/// the update events of the session it is scoped to. A subscriber that
/// falls more than the channel capacity behind is told it lagged.
pub struct ChangeFeed {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    /// Create a feed with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    /// Create a feed buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to live subscribers. Returns how many received it.
    pub fn publish(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of open receivers across all sessions.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribe to update events for `id`.
    #[must_use]
    pub fn subscribe(&self, id: &SessionId) -> Subscription {
        let target = id.clone();
        let events = BroadcastStream::new(self.sender.subscribe())
            .filter_map(move |res| {
                let target = target.clone();
                async move {
                    match res {
                        Ok(event) if event.kind == ChangeKind::Updated && event.id == target => {
                            Some(Ok(event))
                        }
                        Ok(_) => None,
                        Err(BroadcastStreamRecvError::Lagged(n)) => {
                            Some(Err(SubscriptionError::Lagged(n)))
                        }
                    }
                }
            })
            .boxed();

        Subscription::new(id.clone(), events)
    }
}
