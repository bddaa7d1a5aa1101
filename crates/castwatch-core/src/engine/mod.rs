//! Core watch engine
//!
//! The WatchEngine is responsible for:
//! - Driving the timer-based poll loop
//! - Fetching session batches via SessionSource
//! - Fanning out per-session processing (resolve → dedup gate → notify →
//!   commit), one concurrent task per session
//! - Adapting the poll interval to the remote rate-limit budget
//!
//! ## Control Flow
//!
//! ```text
//! ┌────────────────┐   timer fires    ┌──────────────────┐
//! │     Idle       │ ───────────────► │     Polling      │
//! │ (await ticker) │                  │ fetch + dispatch │
//! └────────────────┘ ◄─────────────── └──────────────────┘
//!          ▲          recompute interval        │
//!          └──── rearm timer if changed ────────┘
//! ```
//!
//! Cycles are strictly sequential: the next tick is not processed until
//! the previous cycle's dispatch has fully drained, so two cycles never
//! race on the same dedup keys.
//!
//! ## Interval Recomputation
//!
//! After every poll that yielded a rate-limit snapshot:
//! `ceil(seconds_until_reset / (remaining + 1))`, clamped below by the
//! configured base interval. The `+ 1` reserves budget for the very next
//! call so the limit is never fully exhausted before the window resets.
//! A failed fetch without a snapshot keeps the previous interval.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::WatcherConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::status::{self, NotificationStatus, StatusPolicy};
use crate::traits::{
    Creator, DedupRecord, DedupStore, DeliverySink, RateLimitSnapshot, SessionBatch,
    SessionSnapshot, SessionSource,
};

/// Events emitted by the WatchEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine started
    Started {
        /// Configured interval floor in seconds
        base_interval_secs: u64,
    },

    /// One poll cycle finished (fetch + dispatch)
    PollCompleted {
        /// Number of sessions in the fetched batch
        sessions: usize,
    },

    /// Fetch failed; no dispatch happened this cycle
    FetchFailed {
        /// Rendered cause
        error: String,
    },

    /// A notification went out and was committed
    NotificationSent {
        /// Session the notification was for
        session_id: String,
        /// Stage that was reported
        status: NotificationStatus,
    },

    /// Dedup gate said the stage was already reported (no-op)
    NotificationSkipped {
        /// Session the stage was resolved for
        session_id: String,
        /// Stage that was suppressed
        status: NotificationStatus,
    },

    /// One session's processing failed (others are unaffected)
    SessionFailed {
        /// Session that failed
        session_id: String,
        /// Rendered cause
        error: String,
    },

    /// The adaptive scheduler rearmed the timer
    IntervalChanged {
        /// Previous interval in seconds
        from_secs: u64,
        /// New interval in seconds
        to_secs: u64,
    },

    /// Engine stopped
    Stopped {
        /// Why the loop exited
        reason: String,
    },
}

/// Per-session processing outcome, for event reporting
enum ProcessOutcome {
    Notified(NotificationStatus),
    Skipped(NotificationStatus),
}

/// Core watch engine
///
/// Orchestrates the poll → resolve → dedup → notify → commit flow.
///
/// ## Lifecycle
///
/// 1. Create with [`WatchEngine::new()`]
/// 2. Start with [`WatchEngine::run()`]
/// 3. Engine runs until a shutdown signal is received
///
/// ## Concurrency
///
/// Each poll cycle spawns one task per session in the batch; batch sizes
/// are bounded by the number of watched creators, so no extra pooling is
/// applied. The dedup store is the only shared mutable resource and
/// serializes its own writes.
pub struct WatchEngine {
    /// Session source polled every cycle
    source: Box<dyn SessionSource>,

    /// Durable at-most-once bookkeeping
    store: Arc<dyn DedupStore>,

    /// Stage-keyed notifier over the delivery sink
    notifier: Arc<Notifier>,

    /// Which stages are enabled, with thresholds
    policy: StatusPolicy,

    /// Configured interval floor in seconds
    base_interval_secs: u64,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl WatchEngine {
    /// Create a new watch engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events for logging/monitoring.
    pub fn new(
        source: Box<dyn SessionSource>,
        sink: Arc<dyn DeliverySink>,
        store: Arc<dyn DedupStore>,
        config: WatcherConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.poll.event_channel_capacity);
        let policy = StatusPolicy::from_events(&config.events);
        let notifier = Arc::new(Notifier::new(config.events, sink));

        let engine = Self {
            source,
            store,
            notifier,
            policy,
            base_interval_secs: config.poll.base_interval_secs,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run the engine until SIGINT
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine with a controlled shutdown signal
    ///
    /// Used by the daemon (which owns signal handling) and by contract
    /// tests. An in-flight poll cycle always drains before the loop
    /// exits; the signal is only observed between cycles.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.emit_event(EngineEvent::Started {
            base_interval_secs: self.base_interval_secs,
        });
        info!(
            source = self.source.source_name(),
            base_interval_secs = self.base_interval_secs,
            "watch loop started"
        );

        let mut interval_secs = self.base_interval_secs;
        let mut ticker = ticker_for(interval_secs);

        if let Some(mut rx) = shutdown_rx {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let next = self.poll_cycle(interval_secs).await;
                        if next != interval_secs {
                            self.rearm(&mut ticker, &mut interval_secs, next);
                        }
                    }

                    _ = &mut rx => {
                        info!("shutdown signal received");
                        self.emit_event(EngineEvent::Stopped {
                            reason: "shutdown signal".to_string(),
                        });
                        break;
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let next = self.poll_cycle(interval_secs).await;
                        if next != interval_secs {
                            self.rearm(&mut ticker, &mut interval_secs, next);
                        }
                    }

                    _ = tokio::signal::ctrl_c() => {
                        info!("interrupt received");
                        self.emit_event(EngineEvent::Stopped {
                            reason: "interrupt".to_string(),
                        });
                        break;
                    }
                }
            }
        }

        // Flush durable state before exiting
        self.store.flush().await?;
        info!("dedup store flushed, watch loop stopped");

        Ok(())
    }

    fn rearm(&self, ticker: &mut tokio::time::Interval, current: &mut u64, next: u64) {
        info!(from_secs = *current, to_secs = next, "poll interval changed");
        self.emit_event(EngineEvent::IntervalChanged {
            from_secs: *current,
            to_secs: next,
        });
        *current = next;
        *ticker = ticker_for(next);
    }

    /// Run one fetch + dispatch cycle and return the next interval.
    async fn poll_cycle(&self, current_interval: u64) -> u64 {
        let rate_limit = match self.source.fetch_batch().await {
            Ok(batch) => {
                let rate = batch.rate_limit.clone();
                let count = batch.sessions.len();
                debug!(sessions = count, "fetched session batch");

                if let Err(e) = self.dispatch_batch(batch).await {
                    warn!(error = %e, "batch dispatch finished with failures");
                }
                self.emit_event(EngineEvent::PollCompleted { sessions: count });

                rate
            }
            Err(failure) => {
                error!(
                    source = self.source.source_name(),
                    error = %failure.error,
                    "session fetch failed"
                );
                self.emit_event(EngineEvent::FetchFailed {
                    error: failure.error.to_string(),
                });
                failure.rate_limit
            }
        };

        match rate_limit {
            Some(rate) => next_interval(self.base_interval_secs, &rate, Utc::now()),
            // No snapshot obtained: keep the previous interval and try again.
            None => current_interval,
        }
    }

    /// Process every session in the batch concurrently.
    ///
    /// Failures are isolated per session and reported as they occur; the
    /// call returns only after all tasks finished, with an aggregate
    /// error if at least one failed.
    async fn dispatch_batch(&self, batch: SessionBatch) -> Result<()> {
        if batch.sessions.is_empty() {
            return Ok(());
        }

        let creators = Arc::new(batch.creators);
        let mut tasks = JoinSet::new();

        for session in batch.sessions {
            let store = Arc::clone(&self.store);
            let notifier = Arc::clone(&self.notifier);
            let policy = self.policy.clone();
            let creators = Arc::clone(&creators);
            let event_tx = self.event_tx.clone();

            tasks.spawn(async move {
                let creator = creators
                    .get(&session.creator_id)
                    .cloned()
                    .unwrap_or_else(|| Creator::placeholder(&session.creator_id));
                let session_id = session.id.clone();

                match process_session(&*store, &notifier, &policy, &session, &creator).await {
                    Ok(ProcessOutcome::Notified(status)) => {
                        emit(&event_tx, EngineEvent::NotificationSent {
                            session_id,
                            status,
                        });
                        Ok(())
                    }
                    Ok(ProcessOutcome::Skipped(status)) => {
                        emit(&event_tx, EngineEvent::NotificationSkipped {
                            session_id,
                            status,
                        });
                        Ok(())
                    }
                    Err(e) => {
                        error!(session = %session_id, error = %e, "session processing failed");
                        emit(&event_tx, EngineEvent::SessionFailed {
                            session_id,
                            error: e.to_string(),
                        });
                        Err(e)
                    }
                }
            });
        }

        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => failed += 1,
                Err(join_err) => {
                    error!(error = %join_err, "session task panicked");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            Err(Error::Dispatch { failed })
        } else {
            Ok(())
        }
    }

    /// Emit an engine event, dropping it with a warning when the channel
    /// is full.
    fn emit_event(&self, event: EngineEvent) {
        emit(&self.event_tx, event);
    }
}

fn emit(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if tx.try_send(event).is_err() {
        warn!("engine event channel full, dropping event");
    }
}

/// Build a ticker whose first fire is one full interval away.
fn ticker_for(interval_secs: u64) -> tokio::time::Interval {
    let period = Duration::from_secs(interval_secs.max(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Resolve → dedup gate → notify → commit for one session.
///
/// Commit only happens after a successful delivery; a delivery failure
/// leaves the stored status untouched so the next cycle retries. A crash
/// between deliver and commit can therefore duplicate one notification —
/// accepted at-least-once-on-crash behavior.
async fn process_session(
    store: &dyn DedupStore,
    notifier: &Notifier,
    policy: &StatusPolicy,
    session: &SessionSnapshot,
    creator: &Creator,
) -> Result<ProcessOutcome> {
    let status = status::resolve(session, Utc::now(), policy)?;

    if !store.should_notify(&session.id, status).await? {
        return Ok(ProcessOutcome::Skipped(status));
    }

    notifier.notify(status, session, creator).await?;

    let record = DedupRecord::for_status(status, session, creator);
    store.commit(&session.id, record).await?;

    Ok(ProcessOutcome::Notified(status))
}

/// Compute the next poll interval from a rate-limit snapshot.
///
/// `ceil(seconds_until_reset / (remaining + 1))`, clamped below by
/// `base_secs`. An already-elapsed reset degenerates to the base
/// interval.
fn next_interval(base_secs: u64, rate: &RateLimitSnapshot, now: DateTime<Utc>) -> u64 {
    let until_reset = (rate.reset_at - now).num_seconds().max(0);
    let per_call = (until_reset as u64).div_ceil(u64::from(rate.remaining) + 1) as i64;
    per_call.max(base_secs as i64) as u64
}
