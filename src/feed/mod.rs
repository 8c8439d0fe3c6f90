//! Message feed: ordered, bounded, snapshot-replacing view of one account's
//! conversation with the studio.
//!
//! ARCHITECTURE
//! ============
//! The store (`store`) owns persistence and change notification. The
//! controller (`controller`) owns the materialized window, the subscription
//! task and the single-send gate, and publishes a narrow `FeedView` to the
//! presentation layer. Two store implementations exist: Postgres (`pg`) and
//! process-local (`memory`).
//!
//! ORDERING
//! ========
//! Messages are totally ordered by server-assigned `created_at` ascending,
//! ties broken by store-assigned `id` ascending. A record whose timestamp is
//! still unresolved sorts after every resolved record and keeps its delivery
//! position among other unresolved records.

pub mod controller;
pub mod memory;
pub mod pg;
pub mod store;

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use controller::{FeedController, FeedView, Phase, SendOutcome, Viewer};
pub use store::{MessageStore, StoreError};

/// Default number of records materialized per feed session.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

// =============================================================================
// MESSAGE
// =============================================================================

/// Message payload kind. Only plain text is produced today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
        }
    }
}

impl FromStr for MessageKind {
    type Err = StoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "text" => Ok(Self::Text),
            other => Err(StoreError::Read(format!("unknown message kind: {other}"))),
        }
    }
}

/// One record of an account's feed. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier, unique and stable.
    pub id: String,
    pub text: String,
    pub sender_id: Uuid,
    /// Display name denormalized at send time.
    pub sender_name: String,
    /// Microseconds since Unix epoch, stamped by the store at commit. Kept
    /// at the store's full precision so rows committed within the same
    /// millisecond still order by time. `None` while a write has not been
    /// acknowledged.
    pub created_at: Option<i64>,
    pub kind: MessageKind,
}

/// Append payload. The creation timestamp is always assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub kind: MessageKind,
}

impl NewMessage {
    /// Build a text message, trimming the body. Returns `None` when nothing
    /// but whitespace remains.
    #[must_use]
    pub fn text(body: &str, sender_id: Uuid, sender_name: impl Into<String>) -> Option<Self> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            text: trimmed.to_owned(),
            sender_id,
            sender_name: sender_name.into(),
            kind: MessageKind::Text,
        })
    }
}

// =============================================================================
// ORDERING
// =============================================================================

/// Feed ordering: resolved timestamps ascending, then id ascending.
/// Unresolved timestamps compare equal to each other so a stable sort keeps
/// their delivery order.
#[must_use]
pub fn feed_order(a: &Message, b: &Message) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(ta), Some(tb)) => ta.cmp(&tb).then_with(|| a.id.cmp(&b.id)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort a snapshot into feed order and cut it to `limit` oldest records.
#[must_use]
pub fn materialize(mut snapshot: Vec<Message>, limit: usize) -> Vec<Message> {
    snapshot.sort_by(feed_order);
    snapshot.truncate(limit);
    snapshot
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
