//! Outbound delivery of event batches.
//!
//! Two delivery primitives exist, matching the two lifecycles an embedded
//! client sees:
//!
//! - [`Transport::send`] — the regular path. One attempt per flush, outcome
//!   observed so a failed batch can be restored to the queue.
//! - [`Transport::send_best_effort`] — teardown only. The attempt is made
//!   even while the initiating context unwinds; its outcome is never
//!   observed and no retry is possible.

mod http;

#[cfg(test)]
mod tests;

pub use http::HttpTransport;

use thiserror::Error;

use crate::event::Event;

/// Failure of a single delivery attempt.
///
/// Either variant is recoverable at the engine level: the batch goes back to
/// the queue head and waits for the next flush trigger.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never completed (connect failure, reset, timeout).
    #[error("network error: {0}")]
    Network(String),
    /// The ingestion endpoint answered with a non-success status.
    #[error("ingestion endpoint returned status {0}")]
    Status(u16),
}

/// Delivery backend invoked by the engine worker.
pub trait Transport: Send {
    /// Attempt to deliver one batch, reporting the outcome.
    fn send(&mut self, batch: &[Event]) -> Result<(), TransportError>;

    /// Fire-and-forget dispatch of the remaining queue at teardown.
    ///
    /// Implementations must not block the caller on the network round trip
    /// and must not report an outcome.
    fn send_best_effort(&self, events: Vec<Event>);
}
