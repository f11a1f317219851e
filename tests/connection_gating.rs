//! Tests that bridges touch their endpoints only once connected.

use std::sync::Arc;

use bytes::Bytes;
use rstest::{fixture, rstest};
use tokio::time::{Duration, timeout};
use wirebridge::{
    BridgeError,
    BridgeExit,
    BridgeState,
    ConsumerBridge,
    ProducerBridge,
    TransportConfig,
    queue::InputQueue,
    transport::{ConnectionStatus, SessionId, StreamId, TerminalReason, TransportError},
};
use wirebridge_testing::{IdleCall, RecordingIdleStrategy, ScriptedTransport, join_expect};

#[fixture]
fn transport() -> ScriptedTransport { ScriptedTransport::new() }

fn config(
    transport: &ScriptedTransport,
    idle: &RecordingIdleStrategy,
) -> TransportConfig<ScriptedTransport, RecordingIdleStrategy> {
    TransportConfig::builder(Arc::new(transport.clone()))
        .channel("scripted:gate")
        .stream_id(StreamId::new(8))
        .idle_strategy(idle.clone())
        .build()
        .expect("valid config")
}

#[rstest]
#[tokio::test]
async fn producer_offers_only_after_connecting(transport: ScriptedTransport) {
    transport.publication().connect_after(4);
    let idle = RecordingIdleStrategy::new();
    let (tx, input) = InputQueue::bounded(2);
    tx.send(Bytes::from_static(b"after connect"))
        .await
        .expect("queue open");
    drop(tx);

    let report = join_expect!(ProducerBridge::new(config(&transport, &idle), input).spawn());

    assert_eq!(report.exit, BridgeExit::Completed);
    assert_eq!(transport.publication().connectivity_checks(), 5);
    assert_eq!(transport.publication().attempts().len(), 1);
    // Four failed checks back off; connecting resets.
    assert_eq!(idle.calls()[..5], [
        IdleCall::Idle,
        IdleCall::Idle,
        IdleCall::Idle,
        IdleCall::Idle,
        IdleCall::Reset,
    ]);
}

#[rstest]
#[tokio::test]
async fn unconnected_producer_never_offers(transport: ScriptedTransport) {
    transport.publication().never_connect();
    let idle = RecordingIdleStrategy::new();
    let (tx, input) = InputQueue::bounded(2);
    tx.send(Bytes::from_static(b"waiting")).await.expect("queue open");
    let mut handle = ProducerBridge::new(config(&transport, &idle), input).spawn();
    handle.wait_for(BridgeState::AwaitingConnection).await;

    let probe = transport.publication().clone();
    timeout(Duration::from_secs(5), async {
        while probe.connectivity_checks() < 10 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("gate keeps checking");
    assert_eq!(handle.state(), BridgeState::AwaitingConnection);

    let report = handle.cancel_and_join().await.expect("bridge task");
    assert_eq!(report.exit, BridgeExit::Cancelled);
    assert!(probe.attempts().is_empty());
    assert_eq!(probe.close_count(), 1);
}

#[rstest]
#[tokio::test]
async fn consumer_polls_only_after_connecting(transport: ScriptedTransport) {
    let probe = transport.subscription().clone();
    probe.connect_after(3);
    probe.deliver_message(
        SessionId::new(1),
        b"queued before connect",
        std::num::NonZeroUsize::new(64).expect("non-zero"),
    );
    let idle = RecordingIdleStrategy::new();
    let (bridge, mut output) = ConsumerBridge::new(config(&transport, &idle));
    let handle = bridge.spawn();

    let message = wirebridge_testing::recv_expect!(output);

    assert_eq!(message, Bytes::from_static(b"queued before connect"));
    assert_eq!(probe.connectivity_checks(), 4);
    handle.cancel_and_join().await.expect("bridge task");
}

#[rstest]
#[case::producer(true)]
#[case::consumer(false)]
#[tokio::test]
async fn terminal_status_fails_the_connection(
    transport: ScriptedTransport,
    #[case] outbound: bool,
) {
    let idle = RecordingIdleStrategy::new();
    let report = if outbound {
        transport
            .publication()
            .set_status(ConnectionStatus::Terminal(TerminalReason::Errored));
        let (_tx, input) = InputQueue::bounded(1);
        join_expect!(ProducerBridge::new(config(&transport, &idle), input).spawn())
    } else {
        transport
            .subscription()
            .set_status(ConnectionStatus::Terminal(TerminalReason::Errored));
        let (bridge, _output) = ConsumerBridge::new(config(&transport, &idle));
        join_expect!(bridge.spawn())
    };

    assert_eq!(
        report.exit,
        BridgeExit::ConnectionFailed(TerminalReason::Errored)
    );
    assert!(transport.publication().attempts().is_empty());
    assert_eq!(transport.subscription().polls(), 0);
}

#[rstest]
#[tokio::test]
async fn registration_errors_are_reported(transport: ScriptedTransport) {
    transport.fail_subscriptions(TransportError::InvalidChannel("scripted:gate".into()));
    let idle = RecordingIdleStrategy::new();
    let (bridge, _output) = ConsumerBridge::new(config(&transport, &idle));

    let report = join_expect!(bridge.spawn());

    assert_eq!(
        report.exit,
        BridgeExit::Failed(BridgeError::Registration(TransportError::InvalidChannel(
            "scripted:gate".into()
        )))
    );
    assert_eq!(transport.subscriptions_registered(), 0);
    assert!(idle.calls().is_empty());
}
