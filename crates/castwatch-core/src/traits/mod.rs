// # Core Traits
//
// This module defines the seams between the engine and its external
// collaborators:
//
// - `SessionSource`: fetches session batches from the remote platform
// - `DeliverySink`: posts one rendered notification message
// - `DedupStore`: durable at-most-once bookkeeping per session

pub mod dedup_store;
pub mod delivery;
pub mod session_source;

pub use dedup_store::{DedupRecord, DedupStore};
pub use delivery::{DeliveryReceipt, DeliverySink};
pub use session_source::{
    Creator, FetchFailure, RateLimitSnapshot, SessionBatch, SessionSnapshot, SessionSource,
};
