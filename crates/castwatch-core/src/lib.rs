// # castwatch-core
//
// Core library for the castwatch live-session notification daemon.
//
// ## Architecture Overview
//
// - **SessionSource**: trait for fetching session batches (with the
//   remote rate-limit snapshot) from the platform
// - **DeliverySink**: trait for posting one outbound notification
// - **DedupStore**: trait for durable at-most-once bookkeeping keyed by
//   session id (status only ever increases)
// - **Notifier**: per-stage action table → rendered message → delivery,
//   plus an optional detached side command
// - **WatchEngine**: timer-driven poll loop with rate-limit-adaptive
//   intervals and a concurrent per-session fan-out dispatcher
//
// ## Design Principles
//
// 1. **Separation of Concerns**: the engine owns scheduling and
//    dispatch; sources and sinks are single-shot integrations
// 2. **Monotonic dedup**: stages form a total order and the store gates
//    on a single strict comparison, replacing per-stage boolean flags
// 3. **Failure isolation**: one session's failure never blocks the rest
//    of the batch or the watch loop
// 4. **Library-First**: the daemon is a thin wiring layer over this crate

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod status;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::WatcherConfig;
pub use engine::{EngineEvent, WatchEngine};
pub use error::{Error, Result};
pub use notify::Notifier;
pub use status::{NotificationStatus, StatusPolicy, resolve};
pub use store::{FileDedupStore, MemoryDedupStore};
pub use traits::{DedupStore, DeliverySink, SessionSource};
