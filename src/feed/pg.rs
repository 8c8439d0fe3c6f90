//! Postgres-backed message store.
//!
//! DESIGN
//! ======
//! `created_at` is stamped by Postgres at insert. A trigger on `messages`
//! raises `NOTIFY feed_messages, '<account_id>'` after every insert (see the
//! migrations). One `PgListener` per store receives every notification and
//! fans the account id out on a broadcast channel; each subscription filters
//! for its account, re-reads the full snapshot and forwards it, so consumers
//! always receive complete ordered snapshots. The listener holds a single
//! pool connection no matter how many feeds are open.
//!
//! LIFECYCLE
//! =========
//! The listener starts with the first subscription and runs until its
//! connection fails. Every open subscription then gets one
//! `StoreError::Subscription` before its stream ends, and the next
//! subscription starts a fresh listener.
//!
//! Each subscription pump is a spawned task feeding a bounded channel. It
//! exits when the consumer drops the stream. A pump that falls behind the
//! broadcast re-reads the snapshot instead of replaying what it missed.

use std::sync::Arc;

use futures::StreamExt;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{PgPool, Row};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::store::{MessageStore, SnapshotStream, StoreError, UserRecord};
use super::{Message, MessageKind, NewMessage};

pub const NOTIFY_CHANNEL: &str = "feed_messages";

const SNAPSHOT_CHANNEL_CAPACITY: usize = 16;
const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// What the shared listener tells subscription pumps.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FeedSignal {
    /// A message was inserted for this account.
    Changed(Uuid),
    /// The listener connection failed; no more signals will follow.
    Lost(String),
}

/// Owns the store-wide listener. `signals` is `Some` while it runs.
struct ListenerHub {
    pool: PgPool,
    signals: Mutex<Option<broadcast::Sender<FeedSignal>>>,
}

impl ListenerHub {
    /// Join the running listener, starting it first if needed. The receiver
    /// is registered before this returns, so any insert committed after the
    /// call is signalled to it.
    async fn join(self: &Arc<Self>) -> Result<broadcast::Receiver<FeedSignal>, StoreError> {
        let mut signals = self.signals.lock().await;
        if let Some(tx) = signals.as_ref() {
            return Ok(tx.subscribe());
        }

        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;

        let (tx, rx) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        *signals = Some(tx.clone());
        tokio::spawn(run_listener(Arc::clone(self), listener, tx));
        info!(channel = NOTIFY_CHANNEL, "feed listener: started");
        Ok(rx)
    }
}

/// Relay notifications until the listener connection fails.
async fn run_listener(hub: Arc<ListenerHub>, mut listener: PgListener, tx: broadcast::Sender<FeedSignal>) {
    loop {
        match listener.recv().await {
            Ok(notification) => match Uuid::parse_str(notification.payload()) {
                // No receivers just means no feed is open right now.
                Ok(account_id) => {
                    let _ = tx.send(FeedSignal::Changed(account_id));
                }
                Err(e) => warn!(payload = notification.payload(), error = %e, "feed listener: bad payload"),
            },
            Err(e) => {
                warn!(error = %e, "feed listener: recv failed");
                *hub.signals.lock().await = None;
                let _ = tx.send(FeedSignal::Lost(e.to_string()));
                return;
            }
        }
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
    hub: Arc<ListenerHub>,
}

impl PgMessageStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let hub = Arc::new(ListenerHub { pool: pool.clone(), signals: Mutex::new(None) });
        Self { pool, hub }
    }
}

fn row_to_message(row: &PgRow) -> Result<Message, StoreError> {
    let kind: String = row.get("kind");
    Ok(Message {
        id: row.get("id"),
        text: row.get("text"),
        sender_id: row.get("sender_id"),
        sender_name: row.get("sender_name"),
        created_at: row.get("created_us"),
        kind: kind.parse::<MessageKind>()?,
    })
}

async fn fetch_snapshot(pool: &PgPool, account_id: Uuid, limit: usize) -> Result<Vec<Message>, sqlx::Error> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = sqlx::query(
        r"SELECT id::text AS id,
                 text,
                 sender_id,
                 sender_name,
                 kind,
                 (extract(epoch FROM created_at) * 1000000)::bigint AS created_us
          FROM messages
          WHERE account_id = $1
          ORDER BY created_at ASC, id ASC
          LIMIT $2",
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| row_to_message(row).map_err(|e| sqlx::Error::Decode(Box::new(e))))
        .collect()
}

/// Forward snapshots for `account_id` until the consumer goes away or the
/// shared listener is lost.
async fn pump_snapshots(
    pool: PgPool,
    mut signals: broadcast::Receiver<FeedSignal>,
    account_id: Uuid,
    limit: usize,
    tx: mpsc::Sender<Result<Vec<Message>, StoreError>>,
) {
    loop {
        let signal = tokio::select! {
            () = tx.closed() => {
                debug!(%account_id, "feed pump: consumer dropped");
                return;
            }
            s = signals.recv() => s,
        };

        match signal {
            Ok(FeedSignal::Changed(changed)) if changed != account_id => continue,
            Ok(FeedSignal::Changed(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!(%account_id, skipped, "feed pump: lagged, re-reading snapshot");
            }
            Ok(FeedSignal::Lost(reason)) => {
                let _ = tx.send(Err(StoreError::Subscription(reason))).await;
                return;
            }
            Err(RecvError::Closed) => {
                let _ = tx.send(Err(StoreError::Subscription("listener closed".to_owned()))).await;
                return;
            }
        }

        let item = fetch_snapshot(&pool, account_id, limit)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()));
        let failed = item.is_err();
        if tx.send(item).await.is_err() || failed {
            return;
        }
    }
}

#[async_trait::async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, account_id: Uuid, message: NewMessage) -> Result<String, StoreError> {
        let row = sqlx::query(
            r"INSERT INTO messages (account_id, text, sender_id, sender_name, kind)
              VALUES ($1, $2, $3, $4, $5)
              RETURNING id::text AS id",
        )
        .bind(account_id)
        .bind(&message.text)
        .bind(message.sender_id)
        .bind(&message.sender_name)
        .bind(message.kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(row.get("id"))
    }

    async fn subscribe(&self, account_id: Uuid, limit: usize) -> Result<SnapshotStream, StoreError> {
        let signals = self.hub.join().await?;

        // Read after joining so no insert falls between snapshot and listener.
        let initial = fetch_snapshot(&self.pool, account_id, limit)
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;

        let (tx, rx) = mpsc::channel(SNAPSHOT_CHANNEL_CAPACITY);
        tx.send(Ok(initial))
            .await
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        tokio::spawn(pump_snapshots(self.pool.clone(), signals, account_id, limit, tx));

        let stream = futures::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) });
        Ok(stream.boxed())
    }

    async fn snapshot(&self, account_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError> {
        fetch_snapshot(&self.pool, account_id, limit)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Read(e.to_string()))?;
        Ok(row.map(|r| UserRecord { id: r.get("id"), name: r.get("name") }))
    }
}

#[cfg(test)]
#[path = "pg_test.rs"]
mod tests;
