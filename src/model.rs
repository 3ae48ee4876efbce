// src/model.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single fetched post. Immutable once constructed by the source client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    /// Upstream identifier, stable across runs.
    pub id: String,
    /// Author handle without the leading `@`.
    pub author: String,
    /// Normalized body text.
    pub text: String,
    pub likes: u64,
    pub reshares: u64,
    pub created_at: DateTime<Utc>,
    /// Canonical permalink.
    pub url: String,
}

impl Item {
    /// Combined engagement signal used as a ranking tie-breaker.
    pub fn engagement(&self) -> u64 {
        self.likes.saturating_add(self.reshares)
    }
}

/// An item plus the oracle's verdict. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoredItem {
    pub item: Item,
    /// Relevance 0..=10.
    pub score: u8,
    /// Free-text rationale from the oracle, for the digest reader.
    pub rationale: String,
}

/// Ranked, rendered digest for a single run.
#[derive(Debug, Clone)]
pub struct Digest {
    /// Qualifying items in final order (score desc, engagement desc,
    /// recency desc, id asc).
    pub items: Vec<ScoredItem>,
    /// Rendered markdown, or the empty sentinel when nothing qualified.
    pub rendered: String,
}

impl Digest {
    /// An empty digest is a valid terminal state that suppresses
    /// notification; it is not a delivery failure.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Terminal status of one pipeline pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunStatus {
    /// Every stage succeeded (including the empty-digest short-circuit).
    Done,
    /// Completed and committed, but some items went unscored or some
    /// sinks failed.
    DoneDegraded,
    /// Aborted before commit; the next scheduled run re-attempts.
    Failed,
    /// Cancelled cooperatively between stages; nothing committed.
    Cancelled,
}

/// Per-stage counts for one pass. Appended to the run ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub started_at: DateTime<Utc>,
    pub fetched: usize,
    /// Items surviving the dedupe read.
    pub new: usize,
    /// Items surviving the engagement filter.
    pub engaged: usize,
    /// Items the oracle scored successfully.
    pub scored: usize,
    /// Items that made the digest.
    pub qualified: usize,
    /// Sinks that accepted the digest.
    pub delivered: usize,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
