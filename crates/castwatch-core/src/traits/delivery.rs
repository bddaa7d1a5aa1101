// # Delivery Sink Trait
//
// Defines the interface for posting one rendered notification message to
// the outbound channel (e.g. a status post on the remote network).
//
// ## Implementations
//
// - Twitter status post: `castwatch-twitter` crate
//
// Sinks are single-shot: one call performs exactly one outbound delivery
// attempt and reports success or failure. Retry is owned by the engine
// (implicitly, via the next poll cycle re-evaluating the same session),
// never by the sink.

use async_trait::async_trait;

use crate::error::Result;

/// Result of a delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReceipt {
    /// Message was posted; `id` is the remote identifier of the post
    Posted {
        /// Remote identifier of the created post
        id: String,
    },
    /// Nothing was configured for this stage; no-op success
    Skipped,
}

/// Trait for delivery sink implementations
///
/// Implementations must be thread-safe; the fan-out dispatcher calls
/// `deliver` concurrently for independent sessions.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Perform exactly one outbound delivery of `text`
    ///
    /// # Returns
    ///
    /// - `Ok(DeliveryReceipt::Posted { .. })`: the message went out
    /// - `Err(Error::Delivery)`: transient remote failure; the session is
    ///   retried on the next poll cycle
    async fn deliver(&self, text: &str) -> Result<DeliveryReceipt>;

    /// Name of the sink (for logging/debugging)
    fn sink_name(&self) -> &'static str;
}
