//! Handles and reports for running bridge tasks.

use derive_more::Display;
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{error::BridgeError, transport::TerminalReason};

/// Lifecycle stage of a bridge task.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum BridgeState {
    /// Created but not yet registered with the transport.
    #[display("idle")]
    Idle,
    /// Endpoint registered; waiting for a peer.
    #[display("awaiting-connection")]
    AwaitingConnection,
    /// Producer forwarding queue messages to the transport.
    #[display("sending")]
    Sending,
    /// Consumer polling the transport.
    #[display("receiving")]
    Receiving,
    /// Loop exited; releasing the endpoint.
    #[display("draining")]
    Draining,
    /// Endpoint released; the task is about to return its report.
    #[display("terminated")]
    Terminated,
}

/// Why a bridge stopped.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum BridgeExit {
    /// The input queue closed and every message was sent.
    #[display("completed")]
    Completed,
    /// The bridge's cancellation token fired.
    #[display("cancelled")]
    Cancelled,
    /// The endpoint turned terminal before it connected.
    #[display("connection failed ({_0})")]
    ConnectionFailed(TerminalReason),
    /// The transport reported a terminal condition after connecting.
    #[display("transport closed")]
    TransportClosed,
    /// The application dropped the output queue.
    #[display("output closed")]
    OutputClosed,
    /// A local failure ended the bridge.
    #[display("failed: {_0}")]
    Failed(BridgeError),
}

impl BridgeExit {
    /// Whether the bridge stopped because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool { matches!(self, Self::Cancelled) }
}

/// Final account returned by a bridge task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeReport {
    /// Why the bridge stopped.
    pub exit: BridgeExit,
    /// Messages sent (producer) or delivered to the output queue (consumer).
    pub messages: u64,
    /// Queued input discarded after the transport closed, or fragments
    /// dropped during reassembly.
    pub discarded: u64,
}

impl BridgeReport {
    pub(crate) fn new(exit: BridgeExit) -> Self {
        Self {
            exit,
            messages: 0,
            discarded: 0,
        }
    }
}

/// Publishes state transitions to any [`BridgeHandle`] watchers.
#[derive(Debug)]
pub(crate) struct StateReporter {
    tx: watch::Sender<BridgeState>,
}

impl StateReporter {
    pub(crate) fn new() -> (Self, watch::Receiver<BridgeState>) {
        let (tx, rx) = watch::channel(BridgeState::Idle);
        (Self { tx }, rx)
    }

    /// Record a transition. Works whether or not anyone is watching.
    pub(crate) fn set(&self, state: BridgeState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "bridge state changed");
        }
    }
}

/// Control handle for a spawned bridge task.
///
/// Dropping the handle detaches the task; it keeps running until its input
/// closes, its transport closes, or its token is cancelled.
#[derive(Debug)]
pub struct BridgeHandle {
    shutdown: CancellationToken,
    state: watch::Receiver<BridgeState>,
    task: JoinHandle<BridgeReport>,
}

impl BridgeHandle {
    pub(crate) fn new(
        shutdown: CancellationToken,
        state: watch::Receiver<BridgeState>,
        task: JoinHandle<BridgeReport>,
    ) -> Self {
        Self {
            shutdown,
            state,
            task,
        }
    }

    /// Request cooperative shutdown. The bridge stops within one idle step.
    pub fn cancel(&self) { self.shutdown.cancel(); }

    /// Return the token that stops this bridge.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken { self.shutdown.clone() }

    /// Return the bridge's current lifecycle stage.
    #[must_use]
    pub fn state(&self) -> BridgeState { *self.state.borrow() }

    /// Return a receiver that observes every state transition.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<BridgeState> { self.state.clone() }

    /// Wait until the bridge reaches `state` or terminates.
    ///
    /// Returns the state observed when the wait ended.
    pub async fn wait_for(&mut self, state: BridgeState) -> BridgeState {
        let observed = self
            .state
            .wait_for(|current| *current == state || *current == BridgeState::Terminated)
            .await
            .map(|current| *current);
        observed.unwrap_or_else(|_| *self.state.borrow())
    }

    /// Whether the task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool { self.task.is_finished() }

    /// Wait for the bridge to stop and return its report.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Join`] if the task panicked or was aborted.
    pub async fn join(self) -> Result<BridgeReport, BridgeError> {
        self.task.await.map_err(BridgeError::from)
    }

    /// Cancel the bridge and wait for it to stop.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Join`] if the task panicked or was aborted.
    pub async fn cancel_and_join(self) -> Result<BridgeReport, BridgeError> {
        self.cancel();
        self.join().await
    }
}
