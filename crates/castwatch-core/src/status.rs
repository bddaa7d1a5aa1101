//! Notification status model and the pure status resolver
//!
//! A session moves through an ordered set of notification-worthy stages.
//! The order is total and a stored status never decreases; the dedup
//! store exploits this with a single `>` comparison instead of per-stage
//! "already notified" flags.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EventsConfig;
use crate::error::{Error, Result};
use crate::traits::SessionSnapshot;

/// Lifecycle marker value the platform uses for announced sessions
pub const STATE_SCHEDULED: &str = "scheduled";
/// Lifecycle marker value the platform uses for running sessions
pub const STATE_LIVE: &str = "live";

/// Ordered notification lifecycle stages.
///
/// Derived `Ord` follows declaration order: `None < Schedule <
/// ScheduleRemind < Start`. Higher value = later lifecycle stage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    /// No notification-worthy stage reached
    #[default]
    None,
    /// Session announced with a future start time
    Schedule,
    /// Scheduled start is imminent (inside the configured remind window)
    ScheduleRemind,
    /// Session is live (terminal stage in this model)
    Start,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationStatus::None => "none",
            NotificationStatus::Schedule => "schedule",
            NotificationStatus::ScheduleRemind => "schedule_remind",
            NotificationStatus::Start => "start",
        };
        f.write_str(s)
    }
}

/// Which stages are enabled and their thresholds, derived from the event
/// action table at startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPolicy {
    /// Whether the schedule stage is configured at all
    pub schedule_enabled: bool,
    /// Remind window before the scheduled start; `None` disables reminds
    pub remind_before: Option<Duration>,
}

impl StatusPolicy {
    /// Derive the policy from the configured event action table
    pub fn from_events(events: &EventsConfig) -> Self {
        Self {
            schedule_enabled: events.schedule.is_some(),
            remind_before: events
                .schedule_remind
                .as_ref()
                .and_then(|c| c.before_secs)
                .map(|secs| Duration::seconds(secs as i64)),
        }
    }
}

/// Map a session snapshot to its current notification stage.
///
/// Pure and deterministic given `now`; no I/O, safe to call concurrently.
///
/// # Errors
///
/// `Error::InvalidSession` when the lifecycle marker is missing, or when
/// a scheduled session carries no scheduled start time.
pub fn resolve(
    session: &SessionSnapshot,
    now: DateTime<Utc>,
    policy: &StatusPolicy,
) -> Result<NotificationStatus> {
    let state = session
        .state
        .as_deref()
        .ok_or_else(|| Error::invalid_session(format!("session {}: missing state", session.id)))?;

    match state {
        STATE_LIVE => Ok(NotificationStatus::Start),
        STATE_SCHEDULED => {
            let start = session.scheduled_start.ok_or_else(|| {
                Error::invalid_session(format!(
                    "session {}: scheduled without scheduled_start",
                    session.id
                ))
            })?;

            if let Some(before) = policy.remind_before {
                let remind_cutoff = start - before;
                if now > remind_cutoff {
                    return Ok(NotificationStatus::ScheduleRemind);
                }
            }

            if policy.schedule_enabled {
                Ok(NotificationStatus::Schedule)
            } else {
                Ok(NotificationStatus::None)
            }
        }
        // Any other marker (e.g. "ended") is not notification-worthy.
        _ => Ok(NotificationStatus::None),
    }
}
