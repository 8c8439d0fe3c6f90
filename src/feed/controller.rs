//! Feed controller: one account's live message window plus the send gate.
//!
//! DESIGN
//! ======
//! The controller owns everything the presentation layer reads: the ordered
//! message list, `loaded`, `sending`, the compose draft and the last error.
//! State sits behind a `std::sync::Mutex` that is never held across an
//! `.await`; every change is published as a full `FeedView` on a `watch`
//! channel.
//!
//! LIFECYCLE
//! =========
//! `Idle → Loading → Ready`, with `Failed` when the subscription cannot be
//! opened or dies. `unsubscribe` returns to `Idle`. Orthogonally, `sending`
//! gates `send` so at most one append is in flight per controller.
//!
//! Each subscription carries a generation number. The listener task applies
//! a snapshot only while its generation is current, so notifications that
//! race an `unsubscribe` or a re-`subscribe` are dropped.
//!
//! ERROR HANDLING
//! ==============
//! Store failures never escape as errors. They are logged, folded into the
//! view (`last_error`, `phase`) and reported through `SendOutcome`. A send
//! error shadows a subscription error in `last_error` until the next send
//! starts; starting a send never erases why the subscription failed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::{MessageStore, SnapshotStream, StoreError};
use super::{Message, NewMessage, materialize};
use crate::config::FeedConfig;

const FALLBACK_SENDER_NAME: &str = "User";

// =============================================================================
// TYPES
// =============================================================================

/// Signed-in context the controller acts for. Passed in explicitly so the
/// controller never reaches for ambient session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub account_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No subscription.
    #[default]
    Idle,
    /// Subscribed, no snapshot yet.
    Loading,
    /// Subscribed, snapshot held.
    Ready,
    /// Subscription could not be opened or died. No reconnection.
    Failed,
}

/// Everything the presentation layer may read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedView {
    pub account_id: Option<Uuid>,
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub loaded: bool,
    pub sending: bool,
    pub draft: String,
    pub last_error: Option<String>,
    /// Bumped after every applied snapshot: "scroll to newest".
    pub scroll_seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    EmptyText,
    MissingAccount,
    MissingSender,
    SendInFlight,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::EmptyText => "message text is empty",
            Self::MissingAccount => "no account",
            Self::MissingSender => "no sender",
            Self::SendInFlight => "a send is already in flight",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("rejected: {0}")]
    Validation(RejectReason),
    #[error("write failed: {0}")]
    Write(String),
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("store did not answer within {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl From<StoreError> for FeedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Write(msg) => Self::Write(msg),
            StoreError::Subscription(msg) | StoreError::Read(msg) => Self::Subscription(msg),
        }
    }
}

impl crate::frame::ErrorCode for FeedError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "E_VALIDATION",
            Self::Write(_) => "E_WRITE",
            Self::Subscription(_) => "E_SUBSCRIPTION",
            Self::Timeout(_) => "E_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Timeout(_))
    }
}

/// Result of a send attempt. Validation rejections perform no store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(String),
    Rejected(RejectReason),
    Failed(FeedError),
}

// =============================================================================
// STATE
// =============================================================================

#[derive(Default)]
struct FeedState {
    generation: u64,
    account_id: Option<Uuid>,
    phase: Phase,
    messages: Vec<Message>,
    loaded: bool,
    sending: bool,
    draft: String,
    /// Why the subscription failed; cleared by the next subscribe.
    subscription_error: Option<String>,
    /// Why the last send failed; cleared when the next send starts.
    send_error: Option<String>,
    scroll_seq: u64,
    listener: Option<JoinHandle<()>>,
    sender_names: HashMap<Uuid, String>,
}

impl FeedState {
    fn view(&self) -> FeedView {
        FeedView {
            account_id: self.account_id,
            phase: self.phase,
            messages: self.messages.clone(),
            loaded: self.loaded,
            sending: self.sending,
            draft: self.draft.clone(),
            last_error: self.send_error.clone().or_else(|| self.subscription_error.clone()),
            scroll_seq: self.scroll_seq,
        }
    }

    /// Abort the listener and invalidate its generation.
    fn detach(&mut self) {
        if let Some(handle) = self.listener.take() {
            handle.abort();
        }
        self.generation += 1;
    }
}

struct Shared {
    store: Arc<dyn MessageStore>,
    config: FeedConfig,
    state: Mutex<FeedState>,
    view_tx: watch::Sender<FeedView>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = state.listener.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Cheap to clone; clones share one feed session.
#[derive(Clone)]
pub struct FeedController {
    inner: Arc<Shared>,
}

impl FeedController {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, config: FeedConfig) -> Self {
        let (view_tx, _) = watch::channel(FeedView::default());
        Self {
            inner: Arc::new(Shared { store, config, state: Mutex::new(FeedState::default()), view_tx }),
        }
    }

    /// Current view.
    #[must_use]
    pub fn view(&self) -> FeedView {
        self.inner.view_tx.borrow().clone()
    }

    /// Receiver notified on every view change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<FeedView> {
        self.inner.view_tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` under the lock; publish the view when it reports a change.
    fn mutate<R>(&self, f: impl FnOnce(&mut FeedState) -> (bool, R)) -> R {
        let mut state = self.lock();
        let (changed, out) = f(&mut state);
        if changed {
            self.inner.view_tx.send_replace(state.view());
        }
        out
    }

    // -------------------------------------------------------------------------
    // subscription
    // -------------------------------------------------------------------------

    /// Start (or restart) the live feed for `account_id`. Any previous
    /// subscription is cancelled first.
    pub async fn subscribe(&self, account_id: Uuid) {
        let generation = self.mutate(|st| {
            st.detach();
            st.account_id = Some(account_id);
            st.phase = Phase::Loading;
            st.messages.clear();
            st.loaded = false;
            st.subscription_error = None;
            (true, st.generation)
        });
        info!(%account_id, generation, "feed: subscribing");

        let limit = self.inner.config.history_limit;
        match self.inner.store.subscribe(account_id, limit).await {
            Ok(stream) => {
                let handle = tokio::spawn(run_listener(Arc::downgrade(&self.inner), generation, stream));
                self.mutate(|st| {
                    if st.generation == generation {
                        st.listener = Some(handle);
                    } else {
                        handle.abort();
                    }
                    (false, ())
                });
            }
            Err(e) => {
                warn!(%account_id, error = %e, "feed: subscribe failed");
                self.fail_subscription(generation, &e);
            }
        }
    }

    /// Cancel the live feed. Safe to call repeatedly or with no subscription.
    /// An in-flight send is not cancelled.
    pub fn unsubscribe(&self) {
        let detached = self.mutate(|st| {
            let active = st.listener.is_some() || st.phase != Phase::Idle;
            if !active {
                return (false, None);
            }
            st.detach();
            let account_id = st.account_id.take();
            st.phase = Phase::Idle;
            st.messages.clear();
            st.loaded = false;
            st.subscription_error = None;
            (true, account_id)
        });
        if let Some(account_id) = detached {
            info!(%account_id, "feed: unsubscribed");
        }
    }

    /// Replace the window with `snapshot` if `generation` is still current.
    fn apply_snapshot(&self, generation: u64, snapshot: Vec<Message>) -> bool {
        let limit = self.inner.config.history_limit;
        self.mutate(|st| {
            if st.generation != generation {
                return (false, false);
            }
            st.messages = materialize(snapshot, limit);
            st.loaded = true;
            st.phase = Phase::Ready;
            st.scroll_seq += 1;
            debug!(count = st.messages.len(), generation, "feed: snapshot applied");
            (true, true)
        })
    }

    fn fail_subscription(&self, generation: u64, err: &StoreError) {
        let err = FeedError::from(err.clone());
        self.mutate(|st| {
            if st.generation != generation {
                return (false, ());
            }
            st.listener = None;
            st.phase = Phase::Failed;
            st.subscription_error = Some(err.to_string());
            (true, ())
        });
    }

    // -------------------------------------------------------------------------
    // compose / send
    // -------------------------------------------------------------------------

    /// Replace the compose draft.
    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.mutate(|st| {
            if st.draft == text {
                return (false, ());
            }
            st.draft = text;
            (true, ())
        });
    }

    /// Send the current draft as `viewer`. The draft is cleared only after the
    /// store confirms the write.
    pub async fn submit(&self, viewer: &Viewer) -> SendOutcome {
        let draft = self.lock().draft.clone();
        let outcome = self
            .send(Some(viewer.account_id), &draft, Some(viewer.sender_id), &viewer.sender_name)
            .await;
        if matches!(outcome, SendOutcome::Sent(_)) {
            self.set_draft(String::new());
        }
        outcome
    }

    /// Append one text message to `account_id`'s feed.
    ///
    /// Rejected without a store call when the trimmed text is empty, the
    /// account or sender is missing, or another send is in flight. The new
    /// message is not added locally; it shows up with the store's next
    /// snapshot.
    pub async fn send(
        &self,
        account_id: Option<Uuid>,
        text: &str,
        sender_id: Option<Uuid>,
        sender_name: &str,
    ) -> SendOutcome {
        let Some(account_id) = account_id else {
            return reject(RejectReason::MissingAccount);
        };
        let Some(sender_id) = sender_id else {
            return reject(RejectReason::MissingSender);
        };
        let Some(message) = NewMessage::text(text, sender_id, sender_name) else {
            return reject(RejectReason::EmptyText);
        };

        let acquired = self.mutate(|st| {
            if st.sending {
                return (false, false);
            }
            st.sending = true;
            st.send_error = None;
            (true, true)
        });
        if !acquired {
            return reject(RejectReason::SendInFlight);
        }

        let result = self.append_with_timeout(account_id, message).await;

        self.mutate(|st| {
            st.sending = false;
            if let Err(e) = &result {
                st.send_error = Some(e.to_string());
            }
            (true, ())
        });

        match result {
            Ok(id) => {
                info!(%account_id, %sender_id, message_id = %id, "feed: message sent");
                SendOutcome::Sent(id)
            }
            Err(e) => {
                warn!(%account_id, %sender_id, error = %e, "feed: send failed");
                SendOutcome::Failed(e)
            }
        }
    }

    async fn append_with_timeout(&self, account_id: Uuid, message: NewMessage) -> Result<String, FeedError> {
        let append = self.inner.store.append(account_id, message);
        let Some(limit) = self.inner.config.send_timeout else {
            return append.await.map_err(FeedError::from);
        };
        match tokio::time::timeout(limit, append).await {
            Ok(result) => result.map_err(FeedError::from),
            Err(_) => Err(FeedError::Timeout(limit)),
        }
    }

    // -------------------------------------------------------------------------
    // display name
    // -------------------------------------------------------------------------

    /// Resolve the display name stamped on outgoing messages. Looked up once
    /// per user per session: stored name, then `fallback`, then `"User"`.
    pub async fn resolve_sender_name(&self, user_id: Uuid, fallback: Option<&str>) -> String {
        let cached = self.lock().sender_names.get(&user_id).cloned();
        if let Some(name) = cached {
            return name;
        }

        let stored = match self.inner.store.get_user(user_id).await {
            Ok(record) => record.and_then(|r| r.name),
            Err(e) => {
                warn!(%user_id, error = %e, "feed: sender lookup failed");
                return pick_name(None, fallback);
            }
        };

        let name = pick_name(stored.as_deref(), fallback);
        self.lock().sender_names.insert(user_id, name.clone());
        name
    }
}

fn reject(reason: RejectReason) -> SendOutcome {
    debug!(%reason, "feed: send rejected");
    SendOutcome::Rejected(reason)
}

fn pick_name(stored: Option<&str>, fallback: Option<&str>) -> String {
    [stored, fallback]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or(FALLBACK_SENDER_NAME)
        .to_owned()
}

/// Drain the store stream into the controller until the stream ends, the
/// controller is dropped, or the generation goes stale.
async fn run_listener(shared: Weak<Shared>, generation: u64, mut stream: SnapshotStream) {
    while let Some(item) = stream.next().await {
        let Some(inner) = shared.upgrade() else {
            return;
        };
        let controller = FeedController { inner };
        match item {
            Ok(snapshot) => {
                if !controller.apply_snapshot(generation, snapshot) {
                    debug!(generation, "feed: stale listener exiting");
                    return;
                }
            }
            Err(e) => {
                warn!(generation, error = %e, "feed: subscription error");
                controller.fail_subscription(generation, &e);
                return;
            }
        }
    }
    debug!(generation, "feed: snapshot stream ended");
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
