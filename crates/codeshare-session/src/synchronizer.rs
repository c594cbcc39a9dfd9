//! Session synchronizer: keeps one local buffer reconciled with one stored
//! session record.
//!
//! Local edits are applied optimistically and queued for the store; a
//! per-session writer issues one remote update per edit, in call order.
//! Remote updates arrive over a change subscription and are applied field by
//! field, only when they differ from the local value. Echoes of this
//! client's own writes are recognised and skipped. Concurrent writers
//! resolve last-write-wins at the store; no merge is attempted.

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
};

use codeshare_core::{
    SyncConfig,
    session::{Language, SessionEvent, SessionId, SessionPatch, SessionRecord},
    traits::{Clipboard, ClipboardError, SessionStore, StoreError, Subscription},
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::view::{ChangeOrigin, SaveStatus, ViewState};

/// Synchronizer error.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),
    #[error("Session closed")]
    Closed,
}

/// Local writes to one field that the change feed has not echoed back yet.
///
/// The feed delivers events in commit order, so an event seen while a write
/// is outstanding is either that write's echo or was overwritten by it.
struct Outstanding<T> {
    next_seq: u64,
    /// `(seq, value, settled)` in call order.
    writes: VecDeque<(u64, T, bool)>,
}

impl<T: PartialEq> Outstanding<T> {
    const fn new() -> Self {
        Self {
            next_seq: 0,
            writes: VecDeque::new(),
        }
    }

    fn push(&mut self, value: T) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.writes.push_back((seq, value, false));
        seq
    }

    /// A failed write is never echoed, so it stops counting.
    fn settle(&mut self, seq: u64, ok: bool) {
        if ok {
            if let Some(write) = self.writes.iter_mut().find(|w| w.0 == seq) {
                write.2 = true;
            }
        } else {
            self.writes.retain(|w| w.0 != seq);
        }
    }

    /// Consume an incoming value. Returns true if it must not be applied.
    fn absorb(&mut self, value: &T) -> bool {
        if self.writes.is_empty() {
            return false;
        }
        if let Some(pos) = self.writes.iter().position(|w| w.1 == *value) {
            self.writes.drain(..=pos);
        }
        true
    }

    /// Settled writes whose echo fell into a subscription gap.
    fn forget_settled(&mut self) {
        self.writes.retain(|w| !w.2);
    }

    fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

struct Echoes {
    content: Outstanding<String>,
    language: Outstanding<Language>,
}

impl Echoes {
    const fn new() -> Self {
        Self {
            content: Outstanding::new(),
            language: Outstanding::new(),
        }
    }

    fn settle(&mut self, write: &Write, seq: u64, ok: bool) {
        match write {
            Write::Content { .. } => self.content.settle(seq, ok),
            Write::Language { .. } => self.language.settle(seq, ok),
        }
    }
}

/// View state shared between an `ActiveSession` and its background tasks.
///
/// Every mutation runs under the watch channel's lock and first checks
/// `closed`; teardown flips `closed` under the same lock, so nothing
/// mutates the view after it. `echoes` is only ever locked after the view.
struct Shared {
    view: watch::Sender<ViewState>,
    echoes: Mutex<Echoes>,
    closed: AtomicBool,
}

impl Shared {
    fn new(view: ViewState) -> Self {
        Self {
            view: watch::Sender::new(view),
            echoes: Mutex::new(Echoes::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.view.send_if_modified(|_| {
            self.closed.store(true, Ordering::Release);
            false
        });
    }

    fn echoes(&self) -> MutexGuard<'_, Echoes> {
        self.echoes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mutate(&self, f: impl FnOnce(&mut ViewState) -> bool) -> bool {
        self.view.send_if_modified(|view| {
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            f(view)
        })
    }

    fn set_status(&self, status: SaveStatus) -> bool {
        self.mutate(|view| {
            if view.status == status {
                return false;
            }
            view.status = status;
            true
        })
    }

    fn adopt(&self, record: SessionRecord) -> bool {
        self.mutate(|view| {
            view.merge_fields(
                Some(record.content),
                Some(record.language),
                ChangeOrigin::Initial,
            )
        })
    }

    /// Apply a change-feed event, skipping fields with local writes pending.
    fn apply_remote(&self, content: Option<String>, language: Option<Language>) -> bool {
        self.mutate(|view| {
            let mut echoes = self.echoes();
            let content = content.filter(|c| !echoes.content.absorb(c));
            let language = language.filter(|l| !echoes.language.absorb(l));
            view.merge_fields(content, language, ChangeOrigin::Remote)
        })
    }

    /// Apply a fresh read taken after a subscription gap.
    fn refresh(&self, record: SessionRecord) -> bool {
        self.mutate(|view| {
            let mut echoes = self.echoes();
            echoes.content.forget_settled();
            echoes.language.forget_settled();
            let content = Some(record.content).filter(|_| echoes.content.is_empty());
            let language = Some(record.language).filter(|_| echoes.language.is_empty());
            view.merge_fields(content, language, ChangeOrigin::Remote)
        })
    }

    fn snapshot(&self) -> ViewState {
        self.view.borrow().clone()
    }
}

/// A local change queued for the store.
enum Write {
    Content { value: String, previous: String },
    Language { value: Language, previous: Language },
}

impl Write {
    fn patch(&self) -> SessionPatch {
        match self {
            Self::Content { value, .. } => SessionPatch::content(value.clone()),
            Self::Language { value, .. } => SessionPatch::language(*value),
        }
    }
}

struct WriteRequest {
    write: Write,
    seq: u64,
    reply: oneshot::Sender<Result<(), SyncError>>,
}

/// Completion of one queued write.
///
/// Dropping it does not cancel the write.
#[must_use = "the write proceeds regardless; await this to observe its result"]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<(), SyncError>>,
}

impl Future for PendingWrite {
    type Output = Result<(), SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or(Err(SyncError::Closed)))
    }
}

/// Entry point for synchronizing sessions against a store.
///
/// Cheap to clone; every clone shares the same store handle.
pub struct SessionSynchronizer<S: ?Sized> {
    store: Arc<S>,
    config: Arc<SyncConfig>,
}

impl<S: ?Sized> Clone for SessionSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S> SessionSynchronizer<S>
where
    S: SessionStore + ?Sized + 'static,
{
    /// Create a synchronizer over an injected store.
    #[must_use]
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    /// The store handle.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Enter a session: load or create its record and start listening for
    /// remote updates.
    ///
    /// Store failures here are not fatal. A failed create leaves the
    /// defaults in place with `ErrorCreating` status; a failed subscribe is
    /// retried in the background.
    pub async fn enter(&self, id: SessionId) -> ActiveSession {
        let config = &self.config;
        let shared = Arc::new(Shared::new(ViewState::new(
            config.default_content.clone(),
            config.default_language,
        )));

        // Subscribe before reading so updates landing between the read and
        // the subscribe are not lost.
        let subscription = match self.store.subscribe(&id).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                tracing::warn!("Failed to subscribe to session {id}: {e}");
                None
            }
        };

        match self.store.get(&id).await {
            Ok(Some(record)) => {
                tracing::info!("Joined session {id}");
                shared.adopt(record);
            }
            Ok(None) => self.create(&id, &shared).await,
            Err(e) => {
                // Treat an unreadable record like a missing one; the insert
                // tells the two apart.
                tracing::warn!("Failed to load session {id}: {e}");
                self.create(&id, &shared).await;
            }
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let listener = tokio::spawn(listen(
            Arc::clone(&self.store),
            id.clone(),
            Arc::clone(&shared),
            subscription,
            shutdown_rx,
            Arc::clone(&self.config),
        ));

        let (writes, requests) = mpsc::unbounded_channel();
        tokio::spawn(write_queue(
            Arc::clone(&self.store),
            id.clone(),
            Arc::clone(&shared),
            requests,
            config.rollback_on_save_failure,
        ));

        ActiveSession {
            id,
            config: Arc::clone(&self.config),
            shared,
            writes,
            shutdown_tx: Some(shutdown_tx),
            listener: Some(listener),
        }
    }

    async fn create(&self, id: &SessionId, shared: &Shared) {
        let config = &self.config;
        match self
            .store
            .insert(id, &config.default_content, config.default_language)
            .await
        {
            Ok(_) => tracing::info!("Created session {id}"),
            Err(StoreError::AlreadyExists(_)) => match self.store.get(id).await {
                Ok(Some(record)) => {
                    tracing::info!("Session {id} already existed; joined it");
                    shared.adopt(record);
                }
                Ok(None) => {
                    tracing::error!("Session {id} exists but could not be found");
                    shared.set_status(SaveStatus::ErrorCreating);
                }
                Err(e) => {
                    tracing::error!("Error loading existing session {id}: {e}");
                    shared.set_status(SaveStatus::ErrorCreating);
                }
            },
            Err(e) => {
                tracing::error!("Error creating session {id}: {e}");
                shared.set_status(SaveStatus::ErrorCreating);
            }
        }
    }
}

/// Background task applying remote updates until shutdown.
async fn listen<S>(
    store: Arc<S>,
    id: SessionId,
    shared: Arc<Shared>,
    mut subscription: Option<Subscription>,
    mut shutdown: oneshot::Receiver<()>,
    config: Arc<SyncConfig>,
) where
    S: SessionStore + ?Sized,
{
    let mut failures = 0u32;

    loop {
        let mut sub = match subscription.take() {
            Some(sub) => sub,
            None => {
                if failures >= config.max_resubscribe_attempts {
                    tracing::error!(
                        "Giving up on updates for session {id} after {failures} failed subscribe attempts"
                    );
                    return;
                }
                tokio::select! {
                    _ = &mut shutdown => return,
                    () = tokio::time::sleep(config.resubscribe_delay()) => {}
                }
                match store.subscribe(&id).await {
                    Ok(sub) => {
                        tracing::info!("Resubscribed to session {id}");
                        catch_up(store.as_ref(), &id, &shared).await;
                        sub
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!("Resubscribe to session {id} failed: {e}");
                        continue;
                    }
                }
            }
        };

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    sub.close();
                    return;
                }
                next = sub.next_event() => match next {
                    Some(Ok(event)) => {
                        failures = 0;
                        if shared.is_closed() {
                            sub.close();
                            return;
                        }
                        apply_event(&shared, event);
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Subscription error on session {id}: {e}");
                        break;
                    }
                    None => {
                        tracing::warn!("Subscription for session {id} ended unexpectedly");
                        break;
                    }
                }
            }
        }

        sub.close();
        failures += 1;
    }
}

fn apply_event(shared: &Shared, event: SessionEvent) {
    let SessionEvent {
        id,
        content,
        language,
        ..
    } = event;
    if shared.apply_remote(content, language) {
        tracing::debug!("Applied remote update to session {id}");
    }
}

/// Re-read the record after a gap in the subscription.
async fn catch_up<S>(store: &S, id: &SessionId, shared: &Shared)
where
    S: SessionStore + ?Sized,
{
    match store.get(id).await {
        Ok(Some(record)) => {
            shared.refresh(record);
        }
        Ok(None) => tracing::warn!("Session {id} disappeared from the store"),
        Err(e) => tracing::warn!("Failed to refresh session {id}: {e}"),
    }
}

/// Background task issuing queued writes one at a time, in call order.
///
/// Runs until the owning `ActiveSession` is gone and the queue is drained.
async fn write_queue<S>(
    store: Arc<S>,
    id: SessionId,
    shared: Arc<Shared>,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
    rollback: bool,
) where
    S: SessionStore + ?Sized,
{
    while let Some(WriteRequest { write, seq, reply }) = requests.recv().await {
        let result = store.update(&id, write.patch()).await;
        shared.echoes().settle(&write, seq, result.is_ok());

        if shared.is_closed() {
            tracing::debug!("Discarding write result for session {id} after leaving");
        } else if let Err(e) = &result {
            report_failure(&shared, &id, write, e, rollback);
        } else if matches!(write, Write::Content { .. }) {
            shared.set_status(SaveStatus::Saved);
        }

        // The caller may have dropped its handle.
        let _ = reply.send(result.map_err(SyncError::from));
    }
}

fn report_failure(
    shared: &Shared,
    id: &SessionId,
    write: Write,
    error: &StoreError,
    rollback: bool,
) {
    match write {
        Write::Content { value, previous } => {
            tracing::error!("Error saving session {id}: {error}");
            shared.mutate(|view| {
                if rollback && view.content == value {
                    view.content = previous;
                }
                view.status = SaveStatus::ErrorSaving;
                true
            });
        }
        Write::Language { value, previous } => {
            // Language failures never touch the status slot.
            tracing::error!("Error updating language of session {id}: {error}");
            if rollback {
                shared.mutate(|view| {
                    if view.language != value {
                        return false;
                    }
                    view.language = previous;
                    true
                });
            }
        }
    }
}

/// A session the local client is currently viewing.
///
/// Owns the change subscription (through its listener task). Leaving, or
/// dropping the handle, closes the subscription exactly once and discards
/// any remote results that arrive afterwards. Writes already queued still
/// reach the store.
pub struct ActiveSession {
    id: SessionId,
    config: Arc<SyncConfig>,
    shared: Arc<Shared>,
    writes: mpsc::UnboundedSender<WriteRequest>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    listener: Option<JoinHandle<()>>,
}

impl ActiveSession {
    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Observe view changes.
    #[must_use]
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.shared.view.subscribe()
    }

    /// Current view state.
    #[must_use]
    pub fn snapshot(&self) -> ViewState {
        self.shared.snapshot()
    }

    #[must_use]
    pub fn content(&self) -> String {
        self.shared.view.borrow().content.clone()
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.shared.view.borrow().language
    }

    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.shared.view.borrow().status
    }

    /// Apply a local content edit and queue it for the store.
    ///
    /// The local buffer changes immediately. Every call issues exactly one
    /// remote update, after those of earlier calls; the returned handle
    /// resolves when it completes. A failed write keeps the edit unless
    /// `rollback_on_save_failure` is set.
    pub fn edit_content(&self, content: impl Into<String>) -> PendingWrite {
        let value = content.into();
        self.enqueue(|view, echoes| {
            let previous = std::mem::replace(&mut view.content, value.clone());
            view.content_origin = ChangeOrigin::Local;
            view.status = SaveStatus::Saving;
            let seq = echoes.content.push(value.clone());
            (Write::Content { value, previous }, seq, true)
        })
    }

    /// Apply a local language change and queue it for the store.
    ///
    /// Failures are only logged; the status slot is left alone.
    pub fn change_language(&self, language: Language) -> PendingWrite {
        self.enqueue(|view, echoes| {
            let previous = view.language;
            let changed = previous != language;
            if changed {
                view.language = language;
                view.language_origin = ChangeOrigin::Local;
            }
            let seq = echoes.language.push(language);
            (
                Write::Language {
                    value: language,
                    previous,
                },
                seq,
                changed,
            )
        })
    }

    /// Stage a local change and queue its write under the view lock, so
    /// queue order matches the order edits were applied.
    fn enqueue(
        &self,
        stage: impl FnOnce(&mut ViewState, &mut Echoes) -> (Write, u64, bool),
    ) -> PendingWrite {
        let (reply, rx) = oneshot::channel();
        self.shared.mutate(|view| {
            let mut echoes = self.shared.echoes();
            let (write, seq, changed) = stage(view, &mut echoes);
            if let Err(mpsc::error::SendError(request)) =
                self.writes.send(WriteRequest { write, seq, reply })
            {
                tracing::error!("Write queue for session {} has stopped", self.id);
                echoes.settle(&request.write, request.seq, false);
            }
            changed
        });
        PendingWrite { rx }
    }

    /// Copy `url` to the clipboard and flash "link copied".
    ///
    /// # Errors
    /// Returns error if the clipboard write fails; status is unchanged then.
    pub fn share(&self, clipboard: &dyn Clipboard, url: &str) -> Result<(), SyncError> {
        clipboard.write_text(url)?;
        self.flash_link_copied();
        Ok(())
    }

    /// Show "link copied" for a copy the editor surface made itself.
    ///
    /// The status slot is cleared after the configured delay regardless of
    /// what was written to it in between.
    pub fn flash_link_copied(&self) {
        self.shared.set_status(SaveStatus::LinkCopied);

        let shared = Arc::clone(&self.shared);
        let delay = self.config.status_clear_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.set_status(SaveStatus::Idle);
        });
    }

    /// Leave the session and wait for the listener to stop.
    pub async fn leave(mut self) {
        self.shutdown();
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                tracing::warn!("Listener for session {} failed: {e}", self.id);
            }
        }
        tracing::info!("Left session {}", self.id);
    }

    fn shutdown(&mut self) {
        self.shared.close();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
