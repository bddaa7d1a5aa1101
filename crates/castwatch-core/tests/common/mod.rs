//! Test doubles and common utilities for engine contract tests
//!
//! Provides scriptable implementations of the engine's trait seams,
//! instrumented with shared counters so tests can observe calls after
//! handing the doubles to the engine.
//
// Each contract test binary compiles this module and uses a subset of it.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use castwatch_core::config::{
    EventActionConfig, EventsConfig, NotificationConfig, PollConfig, WatcherConfig,
};
use castwatch_core::error::{Error, Result};
use castwatch_core::traits::{
    Creator, DedupStore, DeliveryReceipt, DeliverySink, FetchFailure, RateLimitSnapshot,
    SessionBatch, SessionSnapshot, SessionSource,
};

/// A session source that serves scripted batches in order, repeating the
/// last batch once the script is exhausted.
#[derive(Clone)]
pub struct ScriptedSessionSource {
    batches: Arc<Vec<SessionBatch>>,
    fetch_count: Arc<AtomicUsize>,
}

impl ScriptedSessionSource {
    pub fn new(batches: Vec<SessionBatch>) -> Self {
        assert!(!batches.is_empty(), "script needs at least one batch");
        Self {
            batches: Arc::new(batches),
            fetch_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionSource for ScriptedSessionSource {
    async fn fetch_batch(&self) -> std::result::Result<SessionBatch, FetchFailure> {
        let call = self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.batches.len() - 1);
        Ok(self.batches[index].clone())
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A delivery sink that records every delivered message.
///
/// Optionally fails the first N deliveries, fails every message whose
/// text contains a marker, and sleeps before answering (for shutdown
/// draining tests).
#[derive(Clone)]
pub struct CountingSink {
    delivered: Arc<std::sync::Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
    fail_first: Arc<AtomicUsize>,
    fail_matching: Option<String>,
    delay: Option<Duration>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self {
            delivered: Arc::new(std::sync::Mutex::new(Vec::new())),
            attempts: Arc::new(AtomicUsize::new(0)),
            fail_first: Arc::new(AtomicUsize::new(0)),
            fail_matching: None,
            delay: None,
        }
    }

    /// Fail the first `n` delivery attempts
    pub fn failing_first(n: usize) -> Self {
        let sink = Self::new();
        sink.fail_first.store(n, Ordering::SeqCst);
        sink
    }

    /// Fail every delivery whose text contains `marker`
    pub fn failing_matching(marker: impl Into<String>) -> Self {
        let mut sink = Self::new();
        sink.fail_matching = Some(marker.into());
        sink
    }

    /// Sleep before completing each delivery
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of delivery attempts (including failed ones)
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully delivered messages, in completion order
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for CountingSink {
    async fn deliver(&self, text: &str) -> Result<DeliveryReceipt> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::delivery(format!("scripted failure #{attempt}")));
        }

        if let Some(marker) = &self.fail_matching
            && text.contains(marker)
        {
            return Err(Error::delivery("scripted matching failure"));
        }

        self.delivered.lock().unwrap().push(text.to_string());
        Ok(DeliveryReceipt::Posted {
            id: format!("post-{attempt}"),
        })
    }

    fn sink_name(&self) -> &'static str {
        "counting"
    }
}

/// A store wrapper that fails the first N commits, for crash-window and
/// retry tests. Reads pass straight through.
#[derive(Clone)]
pub struct FlakyCommitStore<S> {
    inner: S,
    fail_commits: Arc<AtomicUsize>,
}

impl<S: DedupStore> FlakyCommitStore<S> {
    pub fn new(inner: S, fail_commits: usize) -> Self {
        Self {
            inner,
            fail_commits: Arc::new(AtomicUsize::new(fail_commits)),
        }
    }
}

#[async_trait]
impl<S: DedupStore> DedupStore for FlakyCommitStore<S> {
    async fn status(&self, id: &str) -> Result<castwatch_core::NotificationStatus> {
        self.inner.status(id).await
    }

    async fn record(
        &self,
        id: &str,
    ) -> Result<Option<castwatch_core::traits::DedupRecord>> {
        self.inner.record(id).await
    }

    async fn commit(
        &self,
        id: &str,
        record: castwatch_core::traits::DedupRecord,
    ) -> Result<()> {
        if self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::store("scripted commit failure"));
        }
        self.inner.commit(id, record).await
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        self.inner.list_ids().await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// Scheduled session snapshot
pub fn scheduled_session(
    id: &str,
    creator_id: &str,
    title: &str,
    scheduled_start: DateTime<Utc>,
) -> SessionSnapshot {
    SessionSnapshot {
        id: id.to_string(),
        creator_id: creator_id.to_string(),
        title: title.to_string(),
        state: Some("scheduled".to_string()),
        scheduled_start: Some(scheduled_start),
        started_at: None,
        created_at: Some(Utc::now()),
        url: format!("https://example.com/s/{id}"),
    }
}

/// Live session snapshot
pub fn live_session(id: &str, creator_id: &str, title: &str) -> SessionSnapshot {
    SessionSnapshot {
        id: id.to_string(),
        creator_id: creator_id.to_string(),
        title: title.to_string(),
        state: Some("live".to_string()),
        scheduled_start: None,
        started_at: Some(Utc::now()),
        created_at: Some(Utc::now()),
        url: format!("https://example.com/s/{id}"),
    }
}

/// Malformed session snapshot (missing lifecycle marker)
pub fn malformed_session(id: &str, creator_id: &str) -> SessionSnapshot {
    SessionSnapshot {
        id: id.to_string(),
        creator_id: creator_id.to_string(),
        title: "broken".to_string(),
        state: None,
        scheduled_start: None,
        started_at: None,
        created_at: None,
        url: format!("https://example.com/s/{id}"),
    }
}

/// Batch with one creator per session, no rate-limit snapshot
pub fn batch_of(sessions: Vec<SessionSnapshot>) -> SessionBatch {
    let creators: HashMap<String, Creator> = sessions
        .iter()
        .map(|s| {
            (
                s.creator_id.clone(),
                Creator {
                    id: s.creator_id.clone(),
                    name: format!("creator {}", s.creator_id),
                    username: format!("user{}", s.creator_id),
                },
            )
        })
        .collect();

    SessionBatch {
        sessions,
        creators,
        rate_limit: None,
    }
}

/// Attach a rate-limit snapshot to a batch
pub fn with_rate_limit(mut batch: SessionBatch, remaining: u32, reset_in_secs: i64) -> SessionBatch {
    batch.rate_limit = Some(RateLimitSnapshot {
        limit: 300,
        remaining,
        reset_at: Utc::now() + chrono::Duration::seconds(reset_in_secs),
    });
    batch
}

/// Watcher config with all three stages enabled and a 1s interval floor
pub fn minimal_config() -> WatcherConfig {
    WatcherConfig {
        poll: PollConfig {
            base_interval_secs: 1,
            event_channel_capacity: 256,
        },
        events: EventsConfig {
            schedule: Some(EventActionConfig {
                before_secs: None,
                notification: Some(NotificationConfig {
                    message: "scheduled: {title} by {creator_username} {url}".to_string(),
                }),
                command: None,
            }),
            schedule_remind: Some(EventActionConfig {
                before_secs: Some(1800),
                notification: Some(NotificationConfig {
                    message: "soon: {title} {url}".to_string(),
                }),
                command: None,
            }),
            start: Some(EventActionConfig {
                before_secs: None,
                notification: Some(NotificationConfig {
                    message: "live: {title} by {creator_username} {url}".to_string(),
                }),
                command: None,
            }),
        },
    }
}

/// Advance virtual time until `condition` holds, panicking after a bound.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached in time");
}
