//! Error types surfaced by the bridges.
//!
//! Bridge tasks never panic or return errors across their boundary. Terminal
//! conditions are reported through [`BridgeReport`](crate::handle::BridgeReport);
//! [`BridgeError`] carries the local failures that end a bridge early.

use thiserror::Error;
use tokio::task::JoinError;

use crate::transport::TransportError;

/// Local failure that terminated a bridge.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// A message did not fit the producer's send buffer.
    #[error("message of {len} bytes exceeds the {capacity}-byte send buffer")]
    MessageTooLarge { len: usize, capacity: usize },
    /// The transport refused to create the bridge's endpoint.
    #[error("endpoint registration failed: {0}")]
    Registration(#[from] TransportError),
    /// The bridge task panicked or was aborted.
    #[error("bridge task did not complete: {0}")]
    Join(String),
}

impl From<JoinError> for BridgeError {
    fn from(err: JoinError) -> Self { Self::Join(err.to_string()) }
}
