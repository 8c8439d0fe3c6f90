//! Process-local message store.
//!
//! Used for local runs without Postgres (`FEED_STORE=memory`) and as the
//! end-to-end store in tests. Timestamps are microseconds from a clock that
//! never goes backwards, so two appends in the same tick still order by time.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use futures::channel::mpsc;
use uuid::Uuid;

use super::store::{MessageStore, SnapshotStream, StoreError, UserRecord};
use super::{Message, NewMessage, materialize};

type SnapshotSender = mpsc::UnboundedSender<Result<Vec<Message>, StoreError>>;

struct Subscriber {
    tx: SnapshotSender,
    limit: usize,
}

#[derive(Default)]
struct AccountFeed {
    messages: Vec<Message>,
    subscribers: Vec<Subscriber>,
}

#[derive(Default)]
struct Inner {
    feeds: HashMap<Uuid, AccountFeed>,
    users: HashMap<Uuid, Option<String>>,
    next_seq: u64,
    last_ts: i64,
    reject_appends: Option<String>,
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: Mutex<Inner>,
}

impl InMemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user so `get_user` can resolve a display name.
    #[cfg(test)]
    pub fn insert_user(&self, user_id: Uuid, name: Option<&str>) {
        let mut inner = self.lock();
        inner.users.insert(user_id, name.map(str::to_owned));
    }

    /// Make every following append fail with `reason` (`None` restores writes).
    #[cfg(test)]
    pub fn reject_appends(&self, reason: Option<&str>) {
        let mut inner = self.lock();
        inner.reject_appends = reason.map(str::to_owned);
    }

    /// Number of records stored for an account.
    #[cfg(test)]
    #[must_use]
    pub fn len(&self, account_id: Uuid) -> usize {
        self.lock()
            .feeds
            .get(&account_id)
            .map_or(0, |feed| feed.messages.len())
    }

    /// Number of live subscribers for an account. Closed listeners are pruned
    /// on the next publish.
    #[cfg(test)]
    #[must_use]
    pub fn subscriber_count(&self, account_id: Uuid) -> usize {
        self.lock()
            .feeds
            .get(&account_id)
            .map_or(0, |feed| {
                feed.subscribers
                    .iter()
                    .filter(|s| !s.tx.is_closed())
                    .count()
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_micros() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_micros()).unwrap_or(0)
}

/// Push the current snapshot to every subscriber, dropping closed ones.
fn publish(feed: &mut AccountFeed) {
    let messages = &feed.messages;
    feed.subscribers.retain(|sub| {
        let snapshot = materialize(messages.clone(), sub.limit);
        sub.tx.unbounded_send(Ok(snapshot)).is_ok()
    });
}

#[async_trait::async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, account_id: Uuid, message: NewMessage) -> Result<String, StoreError> {
        let mut inner = self.lock();
        if let Some(reason) = &inner.reject_appends {
            return Err(StoreError::Write(reason.clone()));
        }

        inner.next_seq += 1;
        let id = format!("m{}", inner.next_seq);
        let ts = now_micros().max(inner.last_ts + 1);
        inner.last_ts = ts;

        let feed = inner.feeds.entry(account_id).or_default();
        feed.messages.push(Message {
            id: id.clone(),
            text: message.text,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            created_at: Some(ts),
            kind: message.kind,
        });
        publish(feed);
        Ok(id)
    }

    async fn subscribe(&self, account_id: Uuid, limit: usize) -> Result<SnapshotStream, StoreError> {
        let (tx, rx) = mpsc::unbounded();
        let mut inner = self.lock();
        let feed = inner.feeds.entry(account_id).or_default();
        let initial = materialize(feed.messages.clone(), limit);
        tx.unbounded_send(Ok(initial))
            .map_err(|e| StoreError::Subscription(e.to_string()))?;
        feed.subscribers.push(Subscriber { tx, limit });
        Ok(rx.boxed())
    }

    async fn snapshot(&self, account_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError> {
        let inner = self.lock();
        let messages = inner
            .feeds
            .get(&account_id)
            .map(|feed| feed.messages.clone())
            .unwrap_or_default();
        Ok(materialize(messages, limit))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .users
            .get(&user_id)
            .map(|name| UserRecord { id: user_id, name: name.clone() }))
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
