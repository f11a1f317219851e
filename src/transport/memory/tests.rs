//! Tests for the in-process transport.

use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use rstest::{fixture, rstest};

use super::{MemoryTransport, MemoryTransportConfig};
use crate::transport::{
    ConnectionStatus,
    Endpoint,
    FragmentHeader,
    ImageHandler,
    OfferOutcome,
    Publication,
    SessionId,
    StreamId,
    Subscription,
    TerminalReason,
    TransportClient,
    TransportError,
};

const CHANNEL: &str = "memory:tests";
const STREAM: StreamId = StreamId::new(7);

fn noop_handler() -> ImageHandler { Arc::new(|_| {}) }

fn recording_handler() -> (ImageHandler, Arc<Mutex<Vec<SessionId>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: ImageHandler = Arc::new(move |session| {
        sink.lock().expect("image log poisoned").push(session);
    });
    (handler, seen)
}

#[fixture]
fn small_transport() -> MemoryTransport {
    MemoryTransport::with_config(MemoryTransportConfig {
        mtu: NonZeroUsize::new(4).expect("non-zero"),
        term_capacity: NonZeroUsize::new(128).expect("non-zero"),
    })
}

fn drain<S: Subscription>(subscription: &mut S) -> Vec<(Vec<u8>, FragmentHeader)> {
    let mut fragments = Vec::new();
    let mut handler = |buffer: &[u8], header: &FragmentHeader| {
        fragments.push((buffer.to_vec(), *header));
    };
    while subscription.poll(&mut handler, 16) > 0 {}
    fragments
}

#[rstest]
fn endpoints_connect_once_both_sides_exist(small_transport: MemoryTransport) {
    let publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    assert!(!publication.is_connected());
    assert_eq!(publication.channel_status(), ConnectionStatus::Pending);

    let subscription = small_transport
        .add_subscription(CHANNEL, STREAM, noop_handler(), noop_handler())
        .expect("subscription");

    assert!(publication.is_connected());
    assert!(subscription.is_connected());
    assert_eq!(publication.channel_status(), ConnectionStatus::Active);
    assert_eq!(subscription.channel_status(), ConnectionStatus::Active);
}

#[rstest]
fn lone_subscription_is_pending(small_transport: MemoryTransport) {
    let subscription = small_transport
        .add_subscription(CHANNEL, STREAM, noop_handler(), noop_handler())
        .expect("subscription");

    assert!(!subscription.is_connected());
    assert_eq!(subscription.channel_status(), ConnectionStatus::Pending);
}

#[rstest]
fn different_streams_are_isolated(small_transport: MemoryTransport) {
    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, StreamId::new(1))
        .expect("publication");
    let _subscription = small_transport
        .add_subscription(CHANNEL, StreamId::new(2), noop_handler(), noop_handler())
        .expect("subscription");

    assert_eq!(publication.offer(b"x"), OfferOutcome::NotConnected);
}

#[rstest]
fn offers_are_fragmented_above_the_mtu(small_transport: MemoryTransport) {
    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    let mut subscription = small_transport
        .add_subscription(CHANNEL, STREAM, noop_handler(), noop_handler())
        .expect("subscription");

    let outcome = publication.offer(b"abcdefghij");
    assert!(matches!(outcome, OfferOutcome::Accepted(_)));

    let fragments = drain(&mut subscription);
    assert_eq!(fragments.len(), 3);
    assert!(fragments[0].1.flags().is_begin());
    assert!(fragments[2].1.flags().is_end());
    assert!(
        fragments
            .iter()
            .all(|(_, header)| header.session_id() == publication.session_id())
    );
}

#[rstest]
fn full_subscriber_buffer_back_pressures(small_transport: MemoryTransport) {
    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    let mut subscription = small_transport
        .add_subscription(CHANNEL, STREAM, noop_handler(), noop_handler())
        .expect("subscription");

    // 36 bytes charged per single-fragment offer; the fourth does not fit in 128.
    for _ in 0..3 {
        assert!(matches!(publication.offer(b"abcd"), OfferOutcome::Accepted(_)));
    }
    assert_eq!(publication.offer(b"abcd"), OfferOutcome::BackPressured);

    assert_eq!(drain(&mut subscription).len(), 3);
    assert!(matches!(publication.offer(b"abcd"), OfferOutcome::Accepted(_)));
}

#[rstest]
fn offer_larger_than_a_term_is_refused(small_transport: MemoryTransport) {
    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    let mut subscription = small_transport
        .add_subscription(CHANNEL, STREAM, noop_handler(), noop_handler())
        .expect("subscription");

    // 32 fragments of 4 bytes need far more than the 128-byte term.
    let outcome = publication.offer(&[9; 128]);

    assert_eq!(outcome, OfferOutcome::MaxPositionExceeded);
    assert!(outcome.is_terminal());
    assert!(drain(&mut subscription).is_empty());
    assert!(matches!(publication.offer(b"abcd"), OfferOutcome::Accepted(_)));
}

#[rstest]
fn poll_respects_the_fragment_limit(small_transport: MemoryTransport) {
    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    let mut subscription = small_transport
        .add_subscription(CHANNEL, STREAM, noop_handler(), noop_handler())
        .expect("subscription");
    assert!(matches!(publication.offer(b"abcdefghij"), OfferOutcome::Accepted(_)));

    let mut count = 0;
    let mut handler = |_: &[u8], _: &FragmentHeader| count += 1;
    assert_eq!(subscription.poll(&mut handler, 2), 2);
    assert_eq!(subscription.poll(&mut handler, 2), 1);
    assert_eq!(subscription.poll(&mut handler, 2), 0);
    assert_eq!(count, 3);
}

#[rstest]
fn image_callbacks_follow_publication_lifecycle(small_transport: MemoryTransport) {
    let (available, seen_available) = recording_handler();
    let (unavailable, seen_unavailable) = recording_handler();
    let mut subscription = small_transport
        .add_subscription(CHANNEL, STREAM, available, unavailable)
        .expect("subscription");

    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    let session = publication.session_id();
    assert_eq!(*seen_available.lock().expect("poisoned"), vec![session]);

    assert!(matches!(publication.offer(b"ab"), OfferOutcome::Accepted(_)));
    publication.close();
    assert!(seen_unavailable.lock().expect("poisoned").is_empty());
    assert!(subscription.is_connected(), "buffered data keeps the image alive");

    assert_eq!(drain(&mut subscription).len(), 1);
    assert_eq!(*seen_unavailable.lock().expect("poisoned"), vec![session]);
    assert!(!subscription.is_connected());
}

#[rstest]
fn closed_publication_rejects_offers(small_transport: MemoryTransport) {
    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    publication.close();
    publication.close();

    assert_eq!(publication.offer(b"late"), OfferOutcome::Closed);
    assert_eq!(
        publication.channel_status(),
        ConnectionStatus::Terminal(TerminalReason::Closing)
    );
}

#[rstest]
fn closing_the_transport_is_terminal_for_everyone(small_transport: MemoryTransport) {
    let mut publication = small_transport
        .add_exclusive_publication(CHANNEL, STREAM)
        .expect("publication");
    let subscription = small_transport
        .add_subscription(CHANNEL, STREAM, noop_handler(), noop_handler())
        .expect("subscription");

    small_transport.close();

    assert!(subscription.channel_status().is_terminal());
    assert_eq!(publication.offer(b"x"), OfferOutcome::Closed);
    assert_eq!(
        small_transport
            .add_exclusive_publication(CHANNEL, STREAM)
            .err(),
        Some(TransportError::ClientClosed)
    );
}

#[rstest]
fn empty_channel_is_rejected(small_transport: MemoryTransport) {
    assert_eq!(
        small_transport.add_exclusive_publication("", STREAM).err(),
        Some(TransportError::InvalidChannel(String::new()))
    );
}
