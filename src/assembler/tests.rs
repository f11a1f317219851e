//! Tests for fragment reassembly.

use std::num::NonZeroUsize;

use bytes::Bytes;
use proptest::prelude::*;
use rstest::{fixture, rstest};

use super::{AssemblingHandler, AssemblyError, FragmentAssembler};
use crate::transport::{FragmentFlags, FragmentHandler, FragmentHeader, SessionId, StreamId};

const LIMIT: usize = 64;

fn new_assembler() -> FragmentAssembler {
    FragmentAssembler::new(NonZeroUsize::new(LIMIT).expect("non-zero limit"))
}

#[fixture]
fn assembler() -> FragmentAssembler { new_assembler() }

fn header(session: i32, flags: FragmentFlags) -> FragmentHeader {
    FragmentHeader::new(SessionId::new(session), StreamId::new(7), flags)
}

/// Split `payload` into chunks of at most `size` bytes and tag each with the
/// flags a publisher would set.
fn fragments(payload: &[u8], size: usize) -> Vec<(Vec<u8>, FragmentFlags)> {
    if payload.is_empty() {
        return vec![(Vec::new(), FragmentFlags::UNFRAGMENTED)];
    }
    let chunks: Vec<&[u8]> = payload.chunks(size).collect();
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| (chunk.to_vec(), FragmentFlags::for_position(index, count)))
        .collect()
}

#[rstest]
fn unfragmented_message_is_emitted_immediately(mut assembler: FragmentAssembler) {
    let out = assembler
        .push(b"whole", &header(1, FragmentFlags::UNFRAGMENTED))
        .expect("accepted");
    assert_eq!(out.as_deref(), Some(&b"whole"[..]));
    assert_eq!(assembler.buffered_len(), 0);
}

#[rstest]
fn three_fragments_concatenate_in_order(mut assembler: FragmentAssembler) {
    assert_eq!(assembler.push(b"ab", &header(1, FragmentFlags::BEGIN)), Ok(None));
    assert_eq!(assembler.push(b"cd", &header(1, FragmentFlags::MIDDLE)), Ok(None));
    assert_eq!(assembler.buffered_fragments(SessionId::new(1)), 2);

    let out = assembler
        .push(b"ef", &header(1, FragmentFlags::END))
        .expect("accepted");
    assert_eq!(out, Some(Bytes::from_static(b"abcdef")));
    assert_eq!(assembler.buffered_len(), 0);
}

#[rstest]
fn sessions_are_reassembled_independently(mut assembler: FragmentAssembler) {
    assert_eq!(assembler.push(b"a1", &header(1, FragmentFlags::BEGIN)), Ok(None));
    assert_eq!(assembler.push(b"b1", &header(2, FragmentFlags::BEGIN)), Ok(None));
    assert_eq!(assembler.buffered_len(), 2);

    let second = assembler
        .push(b"b2", &header(2, FragmentFlags::END))
        .expect("accepted");
    let first = assembler
        .push(b"a2", &header(1, FragmentFlags::END))
        .expect("accepted");

    assert_eq!(first, Some(Bytes::from_static(b"a1a2")));
    assert_eq!(second, Some(Bytes::from_static(b"b1b2")));
}

#[rstest]
#[case(FragmentFlags::MIDDLE)]
#[case(FragmentFlags::END)]
fn continuation_without_begin_is_orphaned(
    mut assembler: FragmentAssembler,
    #[case] flags: FragmentFlags,
) {
    let err = assembler
        .push(b"lost", &header(3, flags))
        .expect_err("no open message");
    assert_eq!(
        err,
        AssemblyError::OrphanFragment {
            session_id: SessionId::new(3)
        }
    );
}

#[rstest]
fn new_begin_abandons_the_partial_message(mut assembler: FragmentAssembler) {
    assert_eq!(assembler.push(b"old", &header(1, FragmentFlags::BEGIN)), Ok(None));
    assert_eq!(assembler.push(b"new", &header(1, FragmentFlags::BEGIN)), Ok(None));
    let out = assembler
        .push(b"!", &header(1, FragmentFlags::END))
        .expect("accepted");

    assert_eq!(out, Some(Bytes::from_static(b"new!")));
    assert_eq!(assembler.abandoned(), 1);
}

#[rstest]
fn oversized_message_discards_partial_state(mut assembler: FragmentAssembler) {
    let chunk = [0u8; 40];
    assert_eq!(assembler.push(&chunk, &header(1, FragmentFlags::BEGIN)), Ok(None));

    let err = assembler
        .push(&chunk, &header(1, FragmentFlags::MIDDLE))
        .expect_err("exceeds limit");
    assert!(matches!(
        err,
        AssemblyError::MessageTooLarge { attempted: 80, .. }
    ));
    assert_eq!(assembler.buffered_len(), 0);

    // The remainder of the dropped message is now orphaned.
    assert!(matches!(
        assembler.push(&chunk, &header(1, FragmentFlags::END)),
        Err(AssemblyError::OrphanFragment { .. })
    ));
}

#[rstest]
fn oversized_single_fragment_is_rejected(mut assembler: FragmentAssembler) {
    let payload = vec![1u8; LIMIT + 1];
    assert!(matches!(
        assembler.push(&payload, &header(1, FragmentFlags::UNFRAGMENTED)),
        Err(AssemblyError::MessageTooLarge { .. })
    ));
}

#[rstest]
fn free_session_drops_partial_message(mut assembler: FragmentAssembler) {
    assert_eq!(assembler.push(b"half", &header(9, FragmentFlags::BEGIN)), Ok(None));
    assert!(assembler.free_session(SessionId::new(9)));
    assert!(!assembler.free_session(SessionId::new(9)));
    assert_eq!(assembler.buffered_len(), 0);
}

#[rstest]
fn handler_forwards_messages_and_counts_drops(mut assembler: FragmentAssembler) {
    let mut received = Vec::new();
    let mut handler = AssemblingHandler::new(&mut assembler, |message| received.push(message));

    handler.on_fragment(b"orphan", &header(1, FragmentFlags::END));
    handler.on_fragment(b"he", &header(1, FragmentFlags::BEGIN));
    handler.on_fragment(b"llo", &header(1, FragmentFlags::END));
    handler.on_fragment(b"solo", &header(2, FragmentFlags::UNFRAGMENTED));

    assert_eq!(handler.delivered(), 2);
    assert_eq!(handler.dropped(), 1);
    drop(handler);
    assert_eq!(
        received,
        vec![Bytes::from_static(b"hello"), Bytes::from_static(b"solo")]
    );
}

proptest! {
    #[test]
    fn any_split_reassembles_the_original(
        payload in proptest::collection::vec(any::<u8>(), 0..LIMIT),
        size in 1usize..16,
    ) {
        let mut assembler = new_assembler();
        let mut out = None;
        for (chunk, flags) in fragments(&payload, size) {
            prop_assert!(out.is_none(), "message emitted before END");
            out = assembler.push(&chunk, &header(5, flags)).expect("in-order fragments");
        }
        prop_assert_eq!(out.as_deref(), Some(&payload[..]));
        prop_assert_eq!(assembler.buffered_len(), 0);
    }
}
