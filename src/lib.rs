#![doc(html_root_url = "https://docs.rs/wirebridge/latest")]
//! Public API for the `wirebridge` library.
//!
//! This crate bridges in-process tokio queues and a non-blocking, poll-based
//! publish/subscribe transport. A [`ProducerBridge`] drains a queue into a
//! transport publication; a [`ConsumerBridge`] polls a subscription,
//! reassembles fragmented messages, and fills a queue. Both bridges back off
//! through a pluggable [`IdleStrategy`](idle::IdleStrategy) and stop promptly
//! on cancellation.

pub mod assembler;
pub mod config;
pub mod consumer;
pub mod error;
pub mod gate;
pub mod handle;
pub mod idle;
pub mod metrics;
pub mod producer;
pub mod queue;
pub mod tracing_config;
mod tracing_helpers;
pub mod transport;

pub use assembler::{AssemblyError, FragmentAssembler};
pub use config::{BridgeSettings, ConfigError, TransportConfig};
pub use consumer::ConsumerBridge;
pub use error::BridgeError;
pub use handle::{BridgeExit, BridgeHandle, BridgeReport, BridgeState};
pub use metrics::{
    BRIDGES_ACTIVE,
    Direction,
    FRAGMENTS_DROPPED,
    FRAGMENTS_POLLED,
    MESSAGES_RECEIVED,
    MESSAGES_SENT,
    OFFER_RETRIES,
};
pub use producer::ProducerBridge;
pub use queue::{InputQueue, OutputQueue};
pub use tracing_config::TracingConfig;
