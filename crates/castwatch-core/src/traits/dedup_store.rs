// # Dedup Store Trait
//
// Defines the interface for the durable notification dedup store.
//
// ## Purpose
//
// The store guarantees at-most-once notification per (session, stage) by
// tracking the highest stage ever reported for each session id:
//
// - `should_notify` gates on a strict `candidate > stored` comparison
// - `commit` persists the record after a successful delivery
//
// Read-then-decide-then-write is deliberately NOT one transaction across
// the whole pipeline: the outbound delivery cannot join a local
// transaction, so a crash between deliver and commit may duplicate one
// notification (at-least-once on crash). Within a process the engine
// serializes poll cycles, and records for distinct sessions are
// independent, so per-key atomicity is sufficient.
//
// ## Implementations
//
// - File-based: `store::FileDedupStore` (JSON, atomic writes, backup)
// - In-memory: `store::MemoryDedupStore` (tests, ephemeral deployments)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::NotificationStatus;
use crate::traits::session_source::{Creator, SessionSnapshot};

/// Durable record of the last notification reported for a session.
///
/// Keyed by session id in the store. Created on the first notification,
/// then only ever advanced to a higher status; never deleted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupRecord {
    /// Creator account identifier
    pub creator_id: String,
    /// Creator handle at notification time (audit/message context)
    pub username: String,
    /// Session title at notification time
    pub title: String,
    /// Highest notification stage ever reported for this session
    pub status: NotificationStatus,
    /// Announced start, kept for schedule-stage notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Actual start, kept for start-stage notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Creation time of the session resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// When this record was written
    pub notified_at: DateTime<Utc>,
}

impl DedupRecord {
    /// Build the record to persist for a freshly reported stage.
    ///
    /// Schedule stages carry the announced start; the start stage carries
    /// the actual start time instead.
    pub fn for_status(
        status: NotificationStatus,
        session: &SessionSnapshot,
        creator: &Creator,
    ) -> Self {
        let (scheduled_start, started_at) = match status {
            NotificationStatus::Schedule | NotificationStatus::ScheduleRemind => {
                (session.scheduled_start, None)
            }
            NotificationStatus::Start => (None, session.started_at),
            NotificationStatus::None => (None, None),
        };

        Self {
            creator_id: creator.id.clone(),
            username: creator.username.clone(),
            title: session.title.clone(),
            status,
            scheduled_start,
            started_at,
            created_at: session.created_at,
            notified_at: Utc::now(),
        }
    }
}

/// Trait for dedup store implementations
///
/// All methods must be safe to call concurrently; the fan-out dispatcher
/// runs one task per session against the shared store. Writes must be
/// atomic per key; no cross-key transaction is required.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Highest status ever committed for `id`; `None` stage when absent
    async fn status(&self, id: &str) -> crate::error::Result<NotificationStatus>;

    /// Full stored record for `id`, if any
    async fn record(&self, id: &str) -> crate::error::Result<Option<DedupRecord>>;

    /// Whether `candidate` is a new, unreported stage for `id`.
    ///
    /// Strict comparison: an equal or lower candidate is a no-op, which
    /// both implements at-most-once per stage and absorbs stale stages
    /// recomputed by later polls.
    async fn should_notify(
        &self,
        id: &str,
        candidate: NotificationStatus,
    ) -> crate::error::Result<bool> {
        Ok(candidate > self.status(id).await?)
    }

    /// Persist `record` under `id`, atomically for that key.
    ///
    /// Implementations must keep the stored status monotonic: a commit
    /// carrying a status lower than the stored one leaves the entry
    /// unchanged.
    async fn commit(&self, id: &str, record: DedupRecord) -> crate::error::Result<()>;

    /// List all session ids present in the store
    async fn list_ids(&self) -> crate::error::Result<Vec<String>>;

    /// Persist any buffered changes to the underlying medium
    async fn flush(&self) -> crate::error::Result<()>;
}
