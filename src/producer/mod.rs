//! Outbound bridge: in-process queue to transport publication.
//!
//! A [`ProducerBridge`] registers an exclusive publication, waits for it to
//! connect, then forwards every message from its [`InputQueue`] with
//! non-blocking offers. Rejected offers are retried through the configured
//! idle strategy until the transport accepts them, closes, or the bridge is
//! cancelled.

mod offer;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use self::offer::{OfferResult, offer_with_retry};
use crate::{
    config::TransportConfig,
    error::BridgeError,
    gate::{ConnectionGate, GateOutcome},
    handle::{BridgeExit, BridgeHandle, BridgeReport, BridgeState, StateReporter},
    idle::{BackoffIdleStrategy, IdleStrategy},
    metrics::{self, ActiveBridge, Direction},
    queue::InputQueue,
    tracing_config::TracingConfig,
    tracing_helpers::{emit_message_event, producer_span},
    transport::{EndpointGuard, Publication, TransportClient},
};

/// Bridge that drains an [`InputQueue`] into a transport publication.
///
/// Construction has no side effects; nothing touches the transport until
/// [`spawn`](Self::spawn) or [`run`](Self::run).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use bytes::Bytes;
/// use wirebridge::{
///     BridgeExit,
///     ProducerBridge,
///     TransportConfig,
///     queue::InputQueue,
///     transport::{StreamId, memory::MemoryTransport},
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = TransportConfig::builder(Arc::new(MemoryTransport::new()))
///     .channel("memory:doc")
///     .stream_id(StreamId::new(1))
///     .build()
///     .expect("valid config");
/// let (tx, input) = InputQueue::bounded(16);
/// tx.send(Bytes::from_static(b"never sent")).await.expect("queue open");
///
/// // Nobody subscribes, so the bridge waits for a connection until cancelled.
/// let handle = ProducerBridge::new(config, input).spawn();
/// let report = handle.cancel_and_join().await.expect("bridge task");
/// assert_eq!(report.exit, BridgeExit::Cancelled);
/// assert_eq!(report.messages, 0);
/// # }
/// ```
pub struct ProducerBridge<C, S = BackoffIdleStrategy> {
    config: TransportConfig<C, S>,
    input: InputQueue,
    span: Option<Span>,
}

impl<C, S> ProducerBridge<C, S>
where
    C: TransportClient,
    S: IdleStrategy + Clone + 'static,
{
    /// Create a bridge that will drain `input` into the stream described by
    /// `config`.
    pub fn new(config: TransportConfig<C, S>, input: impl Into<InputQueue>) -> Self {
        Self {
            config,
            input: input.into(),
            span: None,
        }
    }

    /// Run the bridge inside `span` instead of the span derived from the
    /// configuration's [`TracingConfig`](crate::TracingConfig).
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Start the bridge on the current tokio runtime with its own
    /// cancellation token.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(self) -> BridgeHandle { self.spawn_with_shutdown(&CancellationToken::new()) }

    /// Start the bridge with a token that is cancelled when `parent` is.
    ///
    /// Cancelling the returned handle does not cancel `parent`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_with_shutdown(self, parent: &CancellationToken) -> BridgeHandle {
        let shutdown = parent.child_token();
        let (reporter, state) = StateReporter::new();
        let task = tokio::spawn(self.drive(shutdown.clone(), reporter));
        BridgeHandle::new(shutdown, state, task)
    }

    /// Run the bridge on the current task until it stops.
    pub async fn run(self, shutdown: CancellationToken) -> BridgeReport {
        let (reporter, _state) = StateReporter::new();
        self.drive(shutdown, reporter).await
    }

    async fn drive(mut self, shutdown: CancellationToken, reporter: StateReporter) -> BridgeReport {
        let span = self.span.take().unwrap_or_else(|| {
            producer_span(
                &self.config.tracing,
                &self.config.channel,
                self.config.stream_id,
            )
        });
        let _active = ActiveBridge::new(Direction::Outbound);
        self.execute(&shutdown, &reporter).instrument(span).await
    }

    async fn execute(self, shutdown: &CancellationToken, reporter: &StateReporter) -> BridgeReport {
        let Self {
            config, mut input, ..
        } = self;
        info!(strategy = config.idle_strategy.alias(), "booting up");

        let publication = match config
            .client
            .add_exclusive_publication(&config.channel, config.stream_id)
        {
            Ok(publication) => publication,
            Err(err) => {
                warn!(error = %err, "publication registration failed");
                reporter.set(BridgeState::Terminated);
                return BridgeReport::new(BridgeExit::Failed(BridgeError::Registration(err)));
            }
        };
        let mut publication = EndpointGuard::new(publication);
        let mut idle = config.idle_strategy.clone();

        reporter.set(BridgeState::AwaitingConnection);
        info!("waiting for active connection");
        let gate = ConnectionGate::new(shutdown).wait(&*publication, &mut idle).await;

        let report = match gate {
            GateOutcome::Ready => {
                reporter.set(BridgeState::Sending);
                info!("starting to send");
                let mut sender = Sender {
                    tracing: &config.tracing,
                    shutdown,
                    capacity: config.buffer_capacity.get(),
                    buffer: Vec::with_capacity(config.buffer_capacity.get()),
                };
                sender
                    .forward(&mut *publication, &mut input, &mut idle)
                    .await
            }
            GateOutcome::Failed(reason) => {
                warn!(%reason, "publication failed before connecting");
                BridgeReport::new(BridgeExit::ConnectionFailed(reason))
            }
            GateOutcome::Aborted => BridgeReport::new(BridgeExit::Cancelled),
        };

        reporter.set(BridgeState::Draining);
        drop(publication);
        info!(
            cancelled = shutdown.is_cancelled(),
            input_closed = input.is_closed(),
            exit = %report.exit,
            messages = report.messages,
            discarded = report.discarded,
            "stopping"
        );
        reporter.set(BridgeState::Terminated);
        report
    }
}

/// Send loop state for one connected publication.
///
/// `buffer` is allocated once at `capacity` and reused for every message.
struct Sender<'a> {
    tracing: &'a TracingConfig,
    shutdown: &'a CancellationToken,
    capacity: usize,
    buffer: Vec<u8>,
}

impl Sender<'_> {
    async fn forward<P, S>(
        &mut self,
        publication: &mut P,
        input: &mut InputQueue,
        idle: &mut S,
    ) -> BridgeReport
    where
        P: Publication + ?Sized,
        S: IdleStrategy,
    {
        let mut report = BridgeReport::new(BridgeExit::Completed);
        loop {
            let next = select! {
                biased;

                () = self.shutdown.cancelled() => {
                    report.exit = BridgeExit::Cancelled;
                    break;
                }
                next = input.recv() => next,
            };
            let Some(message) = next else {
                debug!("input queue closed");
                report.exit = BridgeExit::Completed;
                break;
            };
            if message.len() > self.capacity {
                let err = BridgeError::MessageTooLarge {
                    len: message.len(),
                    capacity: self.capacity,
                };
                warn!(error = %err, "refusing message");
                report.exit = BridgeExit::Failed(err);
                break;
            }
            self.buffer.clear();
            self.buffer.extend_from_slice(&message);

            match offer_with_retry(publication, &self.buffer, idle, self.shutdown).await {
                OfferResult::Sent { position, retries } => {
                    report.messages += 1;
                    metrics::inc_sent();
                    emit_message_event(self.tracing, "sent", &self.buffer);
                    if retries > 0 {
                        debug!(position = position.get(), retries, "offer accepted after retries");
                    }
                }
                OfferResult::Cancelled => {
                    report.exit = BridgeExit::Cancelled;
                    break;
                }
                OfferResult::Terminal(outcome) => {
                    report.discarded = input.close_and_discard();
                    warn!(
                        outcome = outcome.as_str(),
                        discarded = report.discarded,
                        "publication closed, closing input queue"
                    );
                    report.exit = BridgeExit::TransportClosed;
                    break;
                }
            }
        }
        report
    }
}
