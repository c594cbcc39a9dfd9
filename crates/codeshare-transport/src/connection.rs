//! Per-client connection driver.
//!
//! A `Connection` owns at most one `ActiveSession` and translates between
//! wire messages and synchronizer calls. It is transport-agnostic: the
//! WebSocket handler feeds it client messages and drains the outbound
//! channel into the socket.

use codeshare_core::{SessionStore, session::SessionId};
use codeshare_session::{ActiveSession, ChangeOrigin, SessionSynchronizer, ViewState};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::protocol::{ClientMessage, ServerMessage};

/// Send error.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("Channel closed")]
    ChannelClosed,
}

struct Joined {
    session: ActiveSession,
    forwarder: JoinHandle<()>,
}

/// Server side of one client connection.
pub struct Connection<S: ?Sized> {
    synchronizer: SessionSynchronizer<S>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    joined: Option<Joined>,
}

impl<S> Connection<S>
where
    S: SessionStore + ?Sized + 'static,
{
    /// Create a connection that replies through `tx`.
    #[must_use]
    pub const fn new(
        synchronizer: SessionSynchronizer<S>,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            synchronizer,
            tx,
            joined: None,
        }
    }

    /// Session currently joined, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.joined.as_ref().map(|j| j.session.id())
    }

    /// Parse and handle one text frame.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(e) => {
                tracing::warn!("Invalid client message: {e}");
                self.reply(ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                });
            }
        }
    }

    /// Handle one client message.
    pub async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Ping => self.reply(ServerMessage::Pong),
            ClientMessage::Join { session_id } => match SessionId::parse(&session_id) {
                Ok(id) => self.join(id).await,
                Err(e) => self.reply(ServerMessage::Error {
                    message: format!("Invalid session id: {e}"),
                }),
            },
            ClientMessage::Leave => self.leave().await,
            ClientMessage::Edit { content } => {
                if let Some(joined) = self.active() {
                    // Completion is reported through the status slot.
                    drop(joined.session.edit_content(content));
                }
            }
            ClientMessage::SetLanguage { language } => {
                if let Some(joined) = self.active() {
                    drop(joined.session.change_language(language));
                }
            }
            ClientMessage::LinkCopied => {
                // The browser copies the link itself; only the status is shared.
                if let Some(joined) = self.active() {
                    joined.session.flash_link_copied();
                }
            }
        }
    }

    /// Leave the current session, if any.
    pub async fn leave(&mut self) {
        if let Some(joined) = self.joined.take() {
            joined.forwarder.abort();
            joined.session.leave().await;
        }
    }

    fn active(&self) -> Option<&Joined> {
        if self.joined.is_none() {
            self.reply(ServerMessage::Error {
                message: "Not in a session".to_string(),
            });
        }
        self.joined.as_ref()
    }

    async fn join(&mut self, id: SessionId) {
        self.leave().await;

        let session = self.synchronizer.enter(id).await;
        let mut view = session.view();
        let initial = view.borrow_and_update().clone();

        self.reply(ServerMessage::Joined {
            session_id: session.id().to_string(),
            content: initial.content.clone(),
            language: initial.language,
        });
        if initial.status.is_error() {
            self.reply(ServerMessage::status(initial.status));
        }

        let forwarder = tokio::spawn(forward_view(view, initial, self.tx.clone()));
        self.joined = Some(Joined { session, forwarder });
    }

    fn reply(&self, msg: ServerMessage) {
        if self.send(msg).is_err() {
            tracing::debug!("Dropping reply to closed connection");
        }
    }

    /// Queue a message for the client.
    ///
    /// # Errors
    /// Returns error if the connection's outbound channel is closed.
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.tx.send(msg).map_err(|_| SendError::ChannelClosed)
    }
}

/// Forward view changes to the client.
///
/// Only remote-origin content and language changes are sent, so the
/// client's own keystrokes are never echoed back over newer ones.
async fn forward_view(
    mut view: watch::Receiver<ViewState>,
    mut last: ViewState,
    tx: mpsc::UnboundedSender<ServerMessage>,
) {
    while view.changed().await.is_ok() {
        let next = view.borrow_and_update().clone();
        let mut outgoing = Vec::new();

        if next.content != last.content && next.content_origin == ChangeOrigin::Remote {
            outgoing.push(ServerMessage::Content {
                content: next.content.clone(),
            });
        }
        if next.language != last.language && next.language_origin == ChangeOrigin::Remote {
            outgoing.push(ServerMessage::Language {
                language: next.language,
            });
        }
        if next.status != last.status {
            outgoing.push(ServerMessage::status(next.status));
        }
        last = next;

        for msg in outgoing {
            if tx.send(msg).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use codeshare_core::{Language, SyncConfig};
    use codeshare_session::{SaveStatus, storage::MemoryStore};
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    type Rx = mpsc::UnboundedReceiver<ServerMessage>;

    fn connection(store: &Arc<MemoryStore>) -> (Connection<MemoryStore>, Rx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sync = SessionSynchronizer::new(Arc::clone(store), SyncConfig::default());
        (Connection::new(sync, tx), rx)
    }

    async fn next(rx: &mut Rx) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    }

    /// Skip messages until one matches.
    async fn expect(rx: &mut Rx, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
        loop {
            let msg = next(rx).await;
            if pred(&msg) {
                return msg;
            }
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (mut conn, mut rx) = connection(&Arc::new(MemoryStore::new()));
        conn.handle_text(r#"{"type":"ping"}"#).await;
        assert_eq!(next(&mut rx).await, ServerMessage::Pong);
    }

    #[tokio::test]
    async fn test_invalid_message_reports_error() {
        let (mut conn, mut rx) = connection(&Arc::new(MemoryStore::new()));
        conn.handle_text("not json").await;
        assert!(matches!(next(&mut rx).await, ServerMessage::Error { .. }));

        conn.handle(ClientMessage::Join {
            session_id: "bad id".to_string(),
        })
        .await;
        assert!(matches!(next(&mut rx).await, ServerMessage::Error { .. }));
        assert!(conn.session_id().is_none());
    }

    #[tokio::test]
    async fn test_edit_before_join_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (mut conn, mut rx) = connection(&store);
        conn.handle(ClientMessage::Edit {
            content: "x".to_string(),
        })
        .await;
        assert!(matches!(next(&mut rx).await, ServerMessage::Error { .. }));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_join_creates_session() {
        let store = Arc::new(MemoryStore::new());
        let (mut conn, mut rx) = connection(&store);
        conn.handle(ClientMessage::Join {
            session_id: "A1".to_string(),
        })
        .await;

        assert_eq!(
            next(&mut rx).await,
            ServerMessage::Joined {
                session_id: "A1".to_string(),
                content: "// Start coding here...".to_string(),
                language: Language::Javascript,
            }
        );
        assert_eq!(store.len().unwrap(), 1);
        conn.leave().await;
        assert!(conn.session_id().is_none());
    }

    #[tokio::test]
    async fn test_edit_fans_out_to_other_connection() {
        let store = Arc::new(MemoryStore::new());
        let (mut alice, mut alice_rx) = connection(&store);
        let (mut bob, mut bob_rx) = connection(&store);
        let join = || ClientMessage::Join {
            session_id: "B2".to_string(),
        };

        alice.handle(join()).await;
        bob.handle(join()).await;
        next(&mut alice_rx).await;
        next(&mut bob_rx).await;

        alice
            .handle(ClientMessage::Edit {
                content: "x=1".to_string(),
            })
            .await;

        let msg = expect(&mut bob_rx, |m| matches!(m, ServerMessage::Content { .. })).await;
        assert_eq!(
            msg,
            ServerMessage::Content {
                content: "x=1".to_string()
            }
        );

        // The editing client gets status updates but never its own content back.
        let saved = expect(&mut alice_rx, |m| {
            matches!(m, ServerMessage::Content { .. })
                || *m == ServerMessage::status(SaveStatus::Saved)
        })
        .await;
        assert_eq!(saved, ServerMessage::status(SaveStatus::Saved));

        alice
            .handle(ClientMessage::SetLanguage {
                language: Language::Python,
            })
            .await;
        let msg = expect(&mut bob_rx, |m| matches!(m, ServerMessage::Language { .. })).await;
        assert_eq!(
            msg,
            ServerMessage::Language {
                language: Language::Python
            }
        );

        alice.leave().await;
        bob.leave().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_copied_flashes_status() {
        let (mut conn, mut rx) = connection(&Arc::new(MemoryStore::new()));
        conn.handle(ClientMessage::Join {
            session_id: "A1".to_string(),
        })
        .await;
        next(&mut rx).await;

        conn.handle(ClientMessage::LinkCopied).await;

        assert_eq!(
            next(&mut rx).await,
            ServerMessage::status(SaveStatus::LinkCopied)
        );
        assert_eq!(next(&mut rx).await, ServerMessage::status(SaveStatus::Idle));
        conn.leave().await;
    }

    #[tokio::test]
    async fn test_send_fails_once_client_is_gone() {
        let (conn, rx) = connection(&Arc::new(MemoryStore::new()));
        assert_ok!(conn.send(ServerMessage::Pong));

        drop(rx);
        let err = assert_err!(conn.send(ServerMessage::Pong));
        assert!(matches!(err, SendError::ChannelClosed));
    }

    #[tokio::test]
    async fn test_rejoin_switches_sessions() {
        let store = Arc::new(MemoryStore::new());
        let (mut conn, mut rx) = connection(&store);
        for id in ["first", "second"] {
            conn.handle(ClientMessage::Join {
                session_id: id.to_string(),
            })
            .await;
            assert!(matches!(next(&mut rx).await, ServerMessage::Joined { .. }));
        }
        assert_eq!(conn.session_id().map(SessionId::as_str), Some("second"));
        assert_eq!(store.feed().receiver_count(), 1);
        conn.leave().await;
        assert_eq!(store.feed().receiver_count(), 0);
    }
}
