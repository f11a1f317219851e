//! Metric helpers for `wirebridge`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use crate::transport::OfferOutcome;

/// Name of the gauge tracking running bridge tasks.
pub const BRIDGES_ACTIVE: &str = "wirebridge_bridges_active";
/// Name of the counter tracking messages accepted by the transport.
pub const MESSAGES_SENT: &str = "wirebridge_messages_sent_total";
/// Name of the counter tracking offers rejected with a transient code.
pub const OFFER_RETRIES: &str = "wirebridge_offer_retries_total";
/// Name of the counter tracking reassembled messages delivered to the output.
pub const MESSAGES_RECEIVED: &str = "wirebridge_messages_received_total";
/// Name of the counter tracking fragments returned by subscription polls.
pub const FRAGMENTS_POLLED: &str = "wirebridge_fragments_polled_total";
/// Name of the counter tracking fragments dropped during reassembly.
pub const FRAGMENTS_DROPPED: &str = "wirebridge_fragments_dropped_total";

/// Which half of the bridge a metric describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Queue to transport.
    Outbound,
    /// Transport to queue.
    Inbound,
}

impl Direction {
    /// Label value for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Outbound => "outbound",
            Direction::Inbound => "inbound",
        }
    }
}

/// RAII guard incrementing [`BRIDGES_ACTIVE`] on creation and decrementing
/// it on drop.
///
/// A bridge holds one inside its task future, so the gauge is restored when
/// the task completes, is aborted, or is dropped by a runtime shutting down.
#[derive(Debug)]
pub struct ActiveBridge {
    direction: Direction,
}

impl ActiveBridge {
    /// Count a bridge running in `direction` until the guard is dropped.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        inc_bridges(direction);
        Self { direction }
    }
}

impl Drop for ActiveBridge {
    fn drop(&mut self) { dec_bridges(self.direction); }
}

/// Increment the active bridges gauge.
#[cfg(feature = "metrics")]
pub fn inc_bridges(direction: Direction) {
    gauge!(BRIDGES_ACTIVE, "direction" => direction.as_str()).increment(1.0);
}

/// Decrement the active bridges gauge.
#[cfg(feature = "metrics")]
pub fn dec_bridges(direction: Direction) {
    gauge!(BRIDGES_ACTIVE, "direction" => direction.as_str()).decrement(1.0);
}

/// Record a message accepted by the transport.
#[cfg(feature = "metrics")]
pub fn inc_sent() { counter!(MESSAGES_SENT).increment(1); }

/// Record an offer that will be retried, labelled by outcome.
#[cfg(feature = "metrics")]
pub fn inc_offer_retries(outcome: OfferOutcome) {
    counter!(OFFER_RETRIES, "outcome" => outcome.as_str()).increment(1);
}

/// Record messages delivered to the output queue.
#[cfg(feature = "metrics")]
pub fn inc_received(count: u64) { counter!(MESSAGES_RECEIVED).increment(count); }

/// Record fragments returned by one poll.
#[cfg(feature = "metrics")]
pub fn inc_fragments_polled(count: u64) { counter!(FRAGMENTS_POLLED).increment(count); }

/// Record fragments dropped by the assembler.
#[cfg(feature = "metrics")]
pub fn inc_fragments_dropped(count: u64) { counter!(FRAGMENTS_DROPPED).increment(count); }

#[cfg(not(feature = "metrics"))]
pub fn inc_bridges(_direction: Direction) {}

#[cfg(not(feature = "metrics"))]
pub fn dec_bridges(_direction: Direction) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_sent() {}

#[cfg(not(feature = "metrics"))]
pub fn inc_offer_retries(_outcome: OfferOutcome) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_received(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_fragments_polled(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn inc_fragments_dropped(_count: u64) {}
