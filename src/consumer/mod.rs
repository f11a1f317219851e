//! Inbound bridge: transport subscription to in-process queue.
//!
//! A [`ConsumerBridge`] registers a subscription, waits for it to connect,
//! then repeatedly polls it. Fragments are reassembled per session and every
//! complete message is pushed onto the unbounded channel behind the
//! bridge's [`OutputQueue`]. Polls that deliver nothing back off through the
//! configured idle strategy.

use std::sync::Arc;

use bytes::Bytes;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use crate::{
    assembler::{AssemblingHandler, FragmentAssembler},
    config::TransportConfig,
    error::BridgeError,
    gate::{ConnectionGate, GateOutcome},
    handle::{BridgeExit, BridgeHandle, BridgeReport, BridgeState, StateReporter},
    idle::{BackoffIdleStrategy, IdleStrategy},
    metrics::{self, ActiveBridge, Direction},
    queue::OutputQueue,
    tracing_config::TracingConfig,
    tracing_helpers::{consumer_span, emit_message_event},
    transport::{
        ConnectionStatus,
        EndpointGuard,
        ImageHandler,
        SessionId,
        Subscription,
        TransportClient,
    },
};

/// Bridge that fills an [`OutputQueue`] from a transport subscription.
///
/// Construction has no side effects; nothing touches the transport until
/// [`spawn`](Self::spawn) or [`run`](Self::run).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use wirebridge::{
///     BridgeExit,
///     ConsumerBridge,
///     TransportConfig,
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
/// let (bridge, output) = ConsumerBridge::new(config);
///
/// // Dropping the output queue stops the bridge once it is receiving.
/// drop(output);
/// let report = bridge.spawn().cancel_and_join().await.expect("bridge task");
/// assert!(matches!(report.exit, BridgeExit::Cancelled | BridgeExit::OutputClosed));
/// # }
/// ```
pub struct ConsumerBridge<C, S = BackoffIdleStrategy> {
    config: TransportConfig<C, S>,
    output: mpsc::UnboundedSender<Bytes>,
    span: Option<Span>,
}

impl<C, S> ConsumerBridge<C, S>
where
    C: TransportClient,
    S: IdleStrategy + Clone + 'static,
{
    /// Create a bridge for the stream described by `config`, returning the
    /// queue it will fill.
    #[must_use]
    pub fn new(config: TransportConfig<C, S>) -> (Self, OutputQueue) {
        let (output, queue) = OutputQueue::channel();
        (
            Self {
                config,
                output,
                span: None,
            },
            queue,
        )
    }

    /// Run the bridge inside `span` instead of the span derived from the
    /// configuration's [`TracingConfig`].
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
            consumer_span(
                &self.config.tracing,
                &self.config.channel,
                self.config.stream_id,
            )
        });
        let _active = ActiveBridge::new(Direction::Inbound);
        self.execute(&shutdown, &reporter).instrument(span).await
    }

    async fn execute(self, shutdown: &CancellationToken, reporter: &StateReporter) -> BridgeReport {
        let Self { config, output, .. } = self;
        info!(strategy = config.idle_strategy.alias(), "booting up");

        let (images_tx, images) = mpsc::unbounded_channel();
        let (on_available, on_unavailable) = image_handlers(images_tx);
        let subscription = match config.client.add_subscription(
            &config.channel,
            config.stream_id,
            on_available,
            on_unavailable,
        ) {
            Ok(subscription) => subscription,
            Err(err) => {
                warn!(error = %err, "subscription registration failed");
                reporter.set(BridgeState::Terminated);
                return BridgeReport::new(BridgeExit::Failed(BridgeError::Registration(err)));
            }
        };
        let mut subscription = EndpointGuard::new(subscription);
        let mut idle = config.idle_strategy.clone();

        reporter.set(BridgeState::AwaitingConnection);
        info!("waiting for active connection");
        let gate = ConnectionGate::new(shutdown)
            .wait(&*subscription, &mut idle)
            .await;

        let report = match gate {
            GateOutcome::Ready => {
                reporter.set(BridgeState::Receiving);
                info!("starting to receive");
                let mut receiver = Receiver {
                    tracing: &config.tracing,
                    shutdown,
                    fragment_limit: config.fragment_limit.get(),
                    assembler: FragmentAssembler::new(config.max_message_size),
                    images,
                    output: &output,
                };
                receiver.receive(&mut *subscription, &mut idle).await
            }
            GateOutcome::Failed(reason) => {
                warn!(%reason, "subscription failed before connecting");
                BridgeReport::new(BridgeExit::ConnectionFailed(reason))
            }
            GateOutcome::Aborted => BridgeReport::new(BridgeExit::Cancelled),
        };

        reporter.set(BridgeState::Draining);
        drop(subscription);
        info!(
            cancelled = shutdown.is_cancelled(),
            output_closed = output.is_closed(),
            exit = %report.exit,
            messages = report.messages,
            discarded = report.discarded,
            "stopping"
        );
        reporter.set(BridgeState::Terminated);
        report
    }
}

/// Build the image callbacks for a subscription.
///
/// Transports may call these from their own threads, so each callback
/// re-enters the bridge span captured here. Departed sessions are queued so
/// the receive loop can free their reassembly state.
fn image_handlers(departed: mpsc::UnboundedSender<SessionId>) -> (ImageHandler, ImageHandler) {
    let span = Span::current();
    let available_span = span.clone();
    let on_available: ImageHandler = Arc::new(move |session_id| {
        available_span.in_scope(|| info!(%session_id, "image available"));
    });
    let on_unavailable: ImageHandler = Arc::new(move |session_id| {
        span.in_scope(|| info!(%session_id, "image unavailable"));
        let _ = departed.send(session_id);
    });
    (on_available, on_unavailable)
}

/// Outcome of a single poll.
#[derive(Clone, Copy, Debug, Default)]
struct PollSummary {
    fragments: usize,
    delivered: u64,
    dropped: u64,
    output_closed: bool,
}

/// Receive loop state for one connected subscription.
struct Receiver<'a> {
    tracing: &'a TracingConfig,
    shutdown: &'a CancellationToken,
    fragment_limit: usize,
    assembler: FragmentAssembler,
    images: mpsc::UnboundedReceiver<SessionId>,
    output: &'a mpsc::UnboundedSender<Bytes>,
}

impl Receiver<'_> {
    async fn receive<Sub, S>(&mut self, subscription: &mut Sub, idle: &mut S) -> BridgeReport
    where
        Sub: Subscription + ?Sized,
        S: IdleStrategy,
    {
        let mut report = BridgeReport::new(BridgeExit::Cancelled);
        loop {
            if self.shutdown.is_cancelled() {
                report.exit = BridgeExit::Cancelled;
                break;
            }

            let summary = self.poll_once(subscription);
            self.release_departed_sessions();
            report.messages += summary.delivered;
            report.discarded += summary.dropped;
            if summary.fragments > 0 {
                metrics::inc_fragments_polled(u64::try_from(summary.fragments).unwrap_or(u64::MAX));
            }
            metrics::inc_received(summary.delivered);
            if summary.dropped > 0 {
                metrics::inc_fragments_dropped(summary.dropped);
            }

            if summary.output_closed || self.output.is_closed() {
                info!("output queue dropped");
                report.exit = BridgeExit::OutputClosed;
                break;
            }
            if summary.fragments == 0 {
                if let ConnectionStatus::Terminal(reason) = subscription.channel_status() {
                    warn!(%reason, "subscription turned terminal");
                    report.exit = BridgeExit::TransportClosed;
                    break;
                }
            }

            let progress = i64::try_from(summary.fragments).unwrap_or(i64::MAX);
            select! {
                biased;

                () = self.shutdown.cancelled() => {
                    report.exit = BridgeExit::Cancelled;
                    break;
                }
                () = idle.idle_with(progress) => {}
            }
        }
        report
    }

    fn poll_once<Sub>(&mut self, subscription: &mut Sub) -> PollSummary
    where
        Sub: Subscription + ?Sized,
    {
        let tracing = self.tracing;
        let output = self.output;
        let mut sent = 0;
        let mut output_closed = false;
        let mut handler = AssemblingHandler::new(&mut self.assembler, |message: Bytes| {
            emit_message_event(tracing, "received", &message);
            if output.send(message).is_ok() {
                sent += 1;
            } else {
                output_closed = true;
            }
        });
        let fragments = subscription.poll(&mut handler, self.fragment_limit);
        let dropped = handler.dropped();
        drop(handler);
        PollSummary {
            fragments,
            delivered: sent,
            dropped,
            output_closed,
        }
    }

    fn release_departed_sessions(&mut self) {
        while let Ok(session_id) = self.images.try_recv() {
            if self.assembler.free_session(session_id) {
                debug!(%session_id, "released partial message for departed image");
            }
        }
    }
}
