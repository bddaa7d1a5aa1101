// # Session Source Trait
//
// Defines the interface for fetching live-session snapshots from the
// remote platform.
//
// ## Implementations
//
// - Twitter Spaces: `castwatch-twitter` crate
// - Future: other live-audio platforms
//
// Each fetch returns the full batch of sessions currently visible for the
// watched creators, a creator lookup table, and the remote rate-limit
// snapshot read from the response headers. The engine consumes one batch
// per poll cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::Error;

/// Immutable snapshot of one live-audio session, as reported by the
/// remote platform for a single poll cycle.
///
/// Snapshots are re-fetched every cycle and never persisted directly;
/// durable state lives in the dedup store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Stable unique session identifier (the dedup key)
    pub id: String,
    /// Identifier of the creator account hosting the session
    pub creator_id: String,
    /// Display title
    pub title: String,
    /// Raw lifecycle marker (e.g. "scheduled", "live"); absent means the
    /// platform returned a malformed session
    pub state: Option<String>,
    /// Announced start time, present for scheduled sessions
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Actual start time, present once the session went live
    pub started_at: Option<DateTime<Utc>>,
    /// Creation time of the session resource
    pub created_at: Option<DateTime<Utc>>,
    /// Public link to the session, filled in by the source
    pub url: String,
}

/// Creator account owning a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// Stable account identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Handle / screen name
    pub username: String,
}

impl Creator {
    /// Placeholder for a creator the fetch did not expand.
    ///
    /// The upstream lookup table is best-effort; a missing entry degrades
    /// to empty display fields rather than failing the session.
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            username: String::new(),
        }
    }
}

/// Remote rate-limit snapshot read from the fetch response headers.
///
/// Ephemeral; feeds the poll scheduler's interval recomputation and is
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    /// Total request budget for the current window
    pub limit: u32,
    /// Requests remaining in the current window
    pub remaining: u32,
    /// Absolute time at which the window resets
    pub reset_at: DateTime<Utc>,
}

/// One poll cycle's worth of fetched data
#[derive(Debug, Clone)]
pub struct SessionBatch {
    /// Sessions currently visible for the watched creators
    pub sessions: Vec<SessionSnapshot>,
    /// Creator lookup keyed by creator id
    pub creators: HashMap<String, Creator>,
    /// Rate-limit snapshot, if the response carried one
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// A failed fetch, possibly still carrying a rate-limit snapshot.
///
/// The remote reports its budget in response headers, so a fetch that
/// fails after headers were read still informs the scheduler.
#[derive(Debug)]
pub struct FetchFailure {
    /// Rate-limit snapshot, when headers were read before the failure
    pub rate_limit: Option<RateLimitSnapshot>,
    /// Underlying cause
    pub error: Error,
}

impl FetchFailure {
    /// A fetch failure with no usable rate-limit information
    pub fn bare(error: Error) -> Self {
        Self {
            rate_limit: None,
            error,
        }
    }
}

/// Trait for session source implementations
///
/// Implementations must be thread-safe and usable across async tasks.
/// A source performs exactly one remote request per `fetch_batch` call;
/// retry is owned by the engine's next poll cycle.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Fetch the current batch of sessions for the watched creators
    ///
    /// # Returns
    ///
    /// - `Ok(SessionBatch)`: sessions, creator lookup, and rate snapshot
    /// - `Err(FetchFailure)`: the whole batch failed; the failure still
    ///   carries a rate snapshot when the response headers were readable
    async fn fetch_batch(&self) -> std::result::Result<SessionBatch, FetchFailure>;

    /// Name of the source (for logging/debugging)
    fn source_name(&self) -> &'static str;
}
