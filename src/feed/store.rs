//! Message store contract consumed by the feed controller.
//!
//! The store delivers complete ordered snapshots, never deltas. Keeping the
//! controller on this trait lets Postgres and the in-memory store swap freely.

use futures::stream::BoxStream;
use uuid::Uuid;

use super::{Message, NewMessage};

/// Stream of full ordered snapshots for one account. Ends when the
/// underlying listener goes away.
pub type SnapshotStream = BoxStream<'static, Result<Vec<Message>, StoreError>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Append rejected by transport or permissions.
    #[error("write failed: {0}")]
    Write(String),
    /// Listener could not be established or died.
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("read failed: {0}")]
    Read(String),
}

/// Minimal user record used to resolve a sender's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: Option<String>,
}

#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a record to `account_id`'s feed and return its store id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] on transport or permission failure.
    async fn append(&self, account_id: Uuid, message: NewMessage) -> Result<String, StoreError>;

    /// Open a live subscription ordered by creation time ascending, capped at
    /// `limit` records. The first item is the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Subscription`] if the listener cannot be opened.
    async fn subscribe(&self, account_id: Uuid, limit: usize) -> Result<SnapshotStream, StoreError>;

    /// One-shot read of the same query `subscribe` serves.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the query fails.
    async fn snapshot(&self, account_id: Uuid, limit: usize) -> Result<Vec<Message>, StoreError>;

    /// Look up one user record, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] if the lookup fails.
    async fn get_user(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError>;
}
