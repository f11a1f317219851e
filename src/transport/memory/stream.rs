//! Shared per-stream state of the memory transport.

use std::{
    collections::{HashMap, VecDeque},
    num::NonZeroUsize,
};

use bytes::Bytes;

use crate::transport::{FragmentFlags, FragmentHeader, ImageHandler, Position, SessionId, StreamId};

/// Bytes charged per fragment on top of its payload when accounting for
/// subscriber buffer space.
pub(super) const FRAME_HEADER_LENGTH: usize = 32;

/// A fragment waiting in a subscriber's buffer.
#[derive(Clone, Debug)]
pub(super) struct Frame {
    pub header: FragmentHeader,
    pub payload: Bytes,
}

impl Frame {
    fn charge(&self) -> usize { self.payload.len() + FRAME_HEADER_LENGTH }
}

/// Entries delivered to a subscriber in order.
pub(super) enum Delivery {
    Fragment(Frame),
    /// The publisher closed; fired once every earlier fragment was polled.
    ImageClosed(SessionId),
}

pub(super) struct SubscriberSlot {
    entries: VecDeque<Delivery>,
    buffered_bytes: usize,
    pub on_available: ImageHandler,
    pub on_unavailable: ImageHandler,
}

impl SubscriberSlot {
    pub fn new(on_available: ImageHandler, on_unavailable: ImageHandler) -> Self {
        Self {
            entries: VecDeque::new(),
            buffered_bytes: 0,
            on_available,
            on_unavailable,
        }
    }

    fn has_room(&self, charge: usize, capacity: NonZeroUsize) -> bool {
        self.buffered_bytes.saturating_add(charge) <= capacity.get()
    }

    fn push_frame(&mut self, frame: Frame) {
        self.buffered_bytes += frame.charge();
        self.entries.push_back(Delivery::Fragment(frame));
    }

    fn push_image_closed(&mut self, session_id: SessionId) {
        self.entries.push_back(Delivery::ImageClosed(session_id));
    }

    /// Pop entries until `fragment_limit` fragments have been taken.
    pub fn take(&mut self, fragment_limit: usize) -> Vec<Delivery> {
        let mut taken = Vec::new();
        let mut fragments = 0;
        while fragments < fragment_limit {
            let Some(entry) = self.entries.pop_front() else {
                break;
            };
            if let Delivery::Fragment(frame) = &entry {
                self.buffered_bytes -= frame.charge();
                fragments += 1;
            }
            taken.push(entry);
        }
        taken
    }

    pub fn has_pending(&self) -> bool { !self.entries.is_empty() }
}

/// Publications and subscriptions registered on one (channel, stream) pair.
#[derive(Default)]
pub(super) struct StreamState {
    pub publications: Vec<SessionId>,
    pub subscribers: HashMap<u64, SubscriberSlot>,
}

/// Result of appending one message to a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Append {
    Appended,
    /// Some subscriber lacks room right now.
    NoRoom,
    /// The message needs more than a whole term buffer and can never fit.
    ExceedsTerm { charge: usize },
}

impl StreamState {
    /// Split `payload` into fragments of at most `mtu` bytes and append them
    /// to every subscriber. Nothing is appended unless every subscriber has
    /// room for the whole message.
    pub fn append(
        &mut self,
        session_id: SessionId,
        stream_id: StreamId,
        payload: &[u8],
        mtu: NonZeroUsize,
        term_capacity: NonZeroUsize,
        position: &mut u64,
    ) -> Append {
        let frames = fragment(session_id, stream_id, payload, mtu, position);
        let charge: usize = frames.iter().map(Frame::charge).sum();
        if charge > term_capacity.get() {
            return Append::ExceedsTerm { charge };
        }
        if self
            .subscribers
            .values()
            .any(|slot| !slot.has_room(charge, term_capacity))
        {
            return Append::NoRoom;
        }
        for slot in self.subscribers.values_mut() {
            for frame in &frames {
                slot.push_frame(frame.clone());
            }
        }
        let advance = u64::try_from(payload.len()).unwrap_or(u64::MAX);
        *position = position.saturating_add(advance.max(1));
        Append::Appended
    }

    pub fn close_image(&mut self, session_id: SessionId) {
        self.publications.retain(|id| *id != session_id);
        for slot in self.subscribers.values_mut() {
            slot.push_image_closed(session_id);
        }
    }
}

fn fragment(
    session_id: SessionId,
    stream_id: StreamId,
    payload: &[u8],
    mtu: NonZeroUsize,
    position: &u64,
) -> Vec<Frame> {
    let payload = Bytes::copy_from_slice(payload);
    let count = payload.len().div_ceil(mtu.get()).max(1);
    let mut frames = Vec::with_capacity(count);
    let mut offset = 0usize;
    for index in 0..count {
        let end = (offset + mtu.get()).min(payload.len());
        let reached = position.saturating_add(u64::try_from(end).unwrap_or(u64::MAX));
        let header = FragmentHeader::new(
            session_id,
            stream_id,
            FragmentFlags::for_position(index, count),
        )
        .with_position(Position::new(reached));
        frames.push(Frame {
            header,
            payload: payload.slice(offset..end),
        });
        offset = end;
    }
    frames
}
