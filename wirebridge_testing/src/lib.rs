//! Utilities for exercising `wirebridge` bridges in tests.
//!
//! [`ScriptedTransport`] stands in for a real transport client: its probes
//! script connectivity, offer outcomes and inbound fragments, and record
//! every call a bridge makes. [`RecordingIdleStrategy`] logs idle calls so
//! tests can assert on back-off behaviour.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use wirebridge::{ProducerBridge, TransportConfig, queue::InputQueue, transport::StreamId};
//! use wirebridge_testing::{RecordingIdleStrategy, ScriptedTransport};
//!
//! let transport = ScriptedTransport::new();
//! let config = TransportConfig::builder(Arc::new(transport.clone()))
//!     .channel("scripted")
//!     .stream_id(StreamId::new(1))
//!     .idle_strategy(RecordingIdleStrategy::new())
//!     .build()
//!     .expect("valid config");
//! let (_tx, input) = InputQueue::bounded(8);
//! let bridge = ProducerBridge::new(config, input);
//! # drop(bridge);
//! ```

pub mod idle;
pub mod logging;
mod macros;
pub mod metrics;
pub mod scripted;

pub use idle::{IdleCall, RecordingIdleStrategy};
pub use logging::{LoggerHandle, logger};
pub use metrics::{counter_total, debugging_recorder};
pub use scripted::{
    PublicationProbe,
    ScriptedPublication,
    ScriptedSubscription,
    ScriptedTransport,
    SubscriptionProbe,
};
