//! Reassembly tests driving the consumer with scripted fragments.

use std::{num::NonZeroUsize, sync::Arc};

use bytes::Bytes;
use rstest::{fixture, rstest};
use tokio::time::{Duration, timeout};
use wirebridge::{
    BridgeState,
    ConsumerBridge,
    TransportConfig,
    queue::OutputQueue,
    transport::{FragmentFlags, SessionId, StreamId},
};
use wirebridge_testing::{
    IdleCall,
    RecordingIdleStrategy,
    ScriptedTransport,
    SubscriptionProbe,
    recv_expect,
};

const MTU: NonZeroUsize = NonZeroUsize::new(16).expect("non-zero");

#[fixture]
fn transport() -> ScriptedTransport { ScriptedTransport::new() }

fn consumer(
    transport: &ScriptedTransport,
    max_message_size: usize,
) -> (ConsumerBridge<ScriptedTransport, RecordingIdleStrategy>, OutputQueue) {
    consumer_with_idle(transport, max_message_size, &RecordingIdleStrategy::new())
}

fn consumer_with_idle(
    transport: &ScriptedTransport,
    max_message_size: usize,
    idle: &RecordingIdleStrategy,
) -> (ConsumerBridge<ScriptedTransport, RecordingIdleStrategy>, OutputQueue) {
    let config = TransportConfig::builder(Arc::new(transport.clone()))
        .channel("scripted:fragments")
        .stream_id(StreamId::new(12))
        .fragment_limit(4)
        .max_message_size(max_message_size)
        .idle_strategy(idle.clone())
        .build()
        .expect("valid config");
    ConsumerBridge::new(config)
}

async fn polls_beyond(probe: &SubscriptionProbe, count: usize) {
    timeout(Duration::from_secs(5), async {
        while probe.polls() < count {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("bridge keeps polling");
}

#[rstest]
#[tokio::test]
async fn message_spanning_several_polls_is_reassembled(transport: ScriptedTransport) {
    let payload: Vec<u8> = (0..=u8::MAX).collect();
    transport
        .subscription()
        .deliver_message(SessionId::new(1), &payload, MTU);
    let (bridge, mut output) = consumer(&transport, 1024);
    let handle = bridge.spawn();

    assert_eq!(recv_expect!(output), Bytes::from(payload));
    // Sixteen fragments with a limit of four per poll.
    assert!(transport.subscription().polls() >= 4);

    let report = handle.cancel_and_join().await.expect("bridge task");
    assert_eq!(report.messages, 1);
    assert_eq!(report.discarded, 0);
}

#[rstest]
#[tokio::test]
async fn interleaved_sessions_reassemble_independently(transport: ScriptedTransport) {
    let probe = transport.subscription();
    probe.push_fragment(SessionId::new(1), FragmentFlags::BEGIN, b"alpha-");
    probe.push_fragment(SessionId::new(2), FragmentFlags::BEGIN, b"beta-");
    probe.push_fragment(SessionId::new(1), FragmentFlags::END, b"one");
    probe.push_fragment(SessionId::new(2), FragmentFlags::MIDDLE, b"two-");
    probe.push_fragment(SessionId::new(2), FragmentFlags::END, b"three");
    let (bridge, mut output) = consumer(&transport, 1024);
    let handle = bridge.spawn();

    assert_eq!(recv_expect!(output), Bytes::from_static(b"alpha-one"));
    assert_eq!(recv_expect!(output), Bytes::from_static(b"beta-two-three"));
    handle.cancel_and_join().await.expect("bridge task");
}

#[rstest]
#[tokio::test]
async fn orphan_fragments_are_dropped(transport: ScriptedTransport) {
    let probe = transport.subscription();
    probe.push_fragment(SessionId::new(3), FragmentFlags::MIDDLE, b"lost");
    probe.push_fragment(SessionId::new(3), FragmentFlags::END, b"tail");
    probe.deliver_message(SessionId::new(3), b"intact", MTU);
    let (bridge, mut output) = consumer(&transport, 1024);
    let handle = bridge.spawn();

    assert_eq!(recv_expect!(output), Bytes::from_static(b"intact"));
    let report = handle.cancel_and_join().await.expect("bridge task");
    assert_eq!(report.messages, 1);
    assert_eq!(report.discarded, 2);
}

#[rstest]
#[tokio::test]
async fn oversized_message_is_dropped_and_later_ones_delivered(transport: ScriptedTransport) {
    let probe = transport.subscription();
    probe.deliver_message(SessionId::new(4), &[7; 40], MTU);
    probe.deliver_message(SessionId::new(4), b"small", MTU);
    let (bridge, mut output) = consumer(&transport, 32);
    let handle = bridge.spawn();

    assert_eq!(recv_expect!(output), Bytes::from_static(b"small"));
    let report = handle.cancel_and_join().await.expect("bridge task");
    assert_eq!(report.messages, 1);
    assert!(report.discarded >= 1);
}

#[rstest]
#[tokio::test]
async fn departed_image_releases_its_partial_message(transport: ScriptedTransport) {
    let probe = transport.subscription().clone();
    let (bridge, mut output) = consumer(&transport, 1024);
    let mut handle = bridge.spawn();
    handle.wait_for(BridgeState::Receiving).await;

    probe.push_fragment(SessionId::new(5), FragmentFlags::BEGIN, b"head-");
    polls_beyond(&probe, probe.polls() + 1).await;
    assert_eq!(probe.pending(), 0);

    probe.image_unavailable(SessionId::new(5));
    polls_beyond(&probe, probe.polls() + 2).await;

    probe.push_fragment(SessionId::new(5), FragmentFlags::END, b"tail");
    probe.deliver_message(SessionId::new(5), b"fresh", MTU);

    assert_eq!(recv_expect!(output), Bytes::from_static(b"fresh"));
    let report = handle.cancel_and_join().await.expect("bridge task");
    assert_eq!(report.messages, 1);
    assert_eq!(report.discarded, 1);
}

#[rstest]
#[tokio::test]
async fn poll_progress_drives_the_idle_strategy(transport: ScriptedTransport) {
    let subscription = transport.subscription().clone();
    subscription.deliver_message(SessionId::new(6), &[3; 40], MTU);
    let idle = RecordingIdleStrategy::new();
    let (bridge, mut output) = consumer_with_idle(&transport, 1024, &idle);
    let handle = bridge.spawn();

    assert_eq!(recv_expect!(output), Bytes::from(vec![3; 40]));
    polls_beyond(&subscription, 3).await;
    handle.cancel_and_join().await.expect("bridge task");

    let calls = idle.calls();
    let after = |call: IdleCall| {
        calls
            .iter()
            .position(|recorded| *recorded == call)
            .and_then(|index| calls.get(index + 1))
            .copied()
    };
    // Three fragments in the first poll reset the back-off; empty polls idle.
    assert_eq!(after(IdleCall::Progress(3)), Some(IdleCall::Reset));
    assert_eq!(after(IdleCall::Progress(0)), Some(IdleCall::Idle));
    assert!(
        calls
            .windows(2)
            .all(|pair| !matches!(pair, [IdleCall::Progress(n), IdleCall::Idle] if *n > 0))
    );
}
