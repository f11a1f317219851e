//! Readiness gate run before a bridge touches its endpoint.
//!
//! [`ConnectionGate`] busy-polls an endpoint with adaptive back-off until it
//! reports connected, the channel turns terminal, or the bridge is cancelled.
//! It never blocks on the operating system, so cancellation is observed
//! within one back-off step.

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    idle::IdleStrategy,
    transport::{ConnectionStatus, Endpoint, TerminalReason},
};

/// How a connection wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// The endpoint is connected and ready for use.
    Ready,
    /// The endpoint turned terminal before connecting.
    Failed(TerminalReason),
    /// Cancellation arrived first.
    Aborted,
}

/// Waits for an endpoint to become usable.
///
/// # Examples
///
/// ```
/// use tokio_util::sync::CancellationToken;
/// use wirebridge::{
///     gate::{ConnectionGate, GateOutcome},
///     idle::NoOpIdleStrategy,
///     transport::{StreamId, TransportClient, memory::MemoryTransport},
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let transport = MemoryTransport::new();
/// let publication = transport
///     .add_exclusive_publication("memory:gate", StreamId::new(1))
///     .expect("register publication");
/// let shutdown = CancellationToken::new();
/// shutdown.cancel();
///
/// let mut idle = NoOpIdleStrategy;
/// let outcome = ConnectionGate::new(&shutdown)
///     .wait(&publication, &mut idle)
///     .await;
/// assert_eq!(outcome, GateOutcome::Aborted);
/// # }
/// ```
#[derive(Debug)]
pub struct ConnectionGate<'a> {
    shutdown: &'a CancellationToken,
    checks: u64,
}

impl<'a> ConnectionGate<'a> {
    /// Create a gate that aborts once `shutdown` is cancelled.
    #[must_use]
    pub fn new(shutdown: &'a CancellationToken) -> Self { Self { shutdown, checks: 0 } }

    /// Number of connectivity checks performed so far.
    #[must_use]
    pub fn checks(&self) -> u64 { self.checks }

    /// Poll `endpoint` until it is ready, terminal, or the gate is cancelled.
    ///
    /// `idle` is reset when the endpoint becomes ready so the caller's next
    /// wait starts from the fastest back-off level.
    pub async fn wait<E, S>(&mut self, endpoint: &E, idle: &mut S) -> GateOutcome
    where
        E: Endpoint + ?Sized,
        S: IdleStrategy,
    {
        loop {
            if self.shutdown.is_cancelled() {
                debug!(checks = self.checks, "connection wait cancelled");
                return GateOutcome::Aborted;
            }
            self.checks += 1;
            if let ConnectionStatus::Terminal(reason) = endpoint.channel_status() {
                debug!(checks = self.checks, %reason, "endpoint turned terminal while connecting");
                return GateOutcome::Failed(reason);
            }
            if endpoint.is_connected() {
                idle.reset();
                debug!(checks = self.checks, "endpoint connected");
                return GateOutcome::Ready;
            }
            trace!(checks = self.checks, strategy = idle.alias(), "endpoint not connected yet");
            select! {
                biased;

                () = self.shutdown.cancelled() => {}
                () = idle.idle() => {}
            }
        }
    }
}
