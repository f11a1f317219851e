//! Inbound helper that stitches transport fragments back into messages.
//!
//! The transport may split a logical message into several fragments below its
//! MTU. [`FragmentAssembler`] copies fragment payloads into an accumulation
//! buffer keyed by delivery session and hands back the concatenated message
//! once the END fragment arrives. Unfragmented deliveries are copied and
//! returned immediately without touching any session buffer.
//!
//! Partial messages never leave the assembler: a caller only ever sees
//! complete payloads.

mod handler;

use std::{
    collections::{HashMap, hash_map::Entry},
    num::NonZeroUsize,
};

use bytes::{Bytes, BytesMut};
pub use handler::AssemblingHandler;
use thiserror::Error;

use crate::transport::{FragmentHeader, SessionId};

/// Errors raised while reassembling a message.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum AssemblyError {
    /// The reassembled payload would exceed the configured cap. Any partial
    /// state for the session has been discarded.
    #[error("message on session {session_id} too large: {attempted} bytes exceeds {limit}")]
    MessageTooLarge {
        session_id: SessionId,
        attempted: usize,
        limit: NonZeroUsize,
    },
    /// A middle or END fragment arrived without a preceding BEGIN.
    #[error("fragment on session {session_id} has no open message")]
    OrphanFragment { session_id: SessionId },
}

#[derive(Debug)]
struct PartialMessage {
    buffer: BytesMut,
    fragments: usize,
}

impl PartialMessage {
    fn new(payload: &[u8]) -> Self {
        Self {
            buffer: BytesMut::from(payload),
            fragments: 1,
        }
    }

    fn push(&mut self, payload: &[u8]) {
        self.buffer.extend_from_slice(payload);
        self.fragments += 1;
    }

    fn len(&self) -> usize { self.buffer.len() }

    fn into_message(self) -> Bytes { self.buffer.freeze() }
}

/// Stateful per-session fragment reassembler.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use wirebridge::{
///     assembler::FragmentAssembler,
///     transport::{FragmentFlags, FragmentHeader, SessionId, StreamId},
/// };
///
/// let mut assembler = FragmentAssembler::new(NonZeroUsize::new(64).expect("non-zero"));
/// let header = |flags| FragmentHeader::new(SessionId::new(1), StreamId::new(1), flags);
///
/// assert_eq!(assembler.push(b"hel", &header(FragmentFlags::BEGIN)), Ok(None));
/// let message = assembler
///     .push(b"lo", &header(FragmentFlags::END))
///     .expect("in order")
///     .expect("complete");
/// assert_eq!(&message[..], b"hello");
/// ```
#[derive(Debug)]
pub struct FragmentAssembler {
    max_message_size: NonZeroUsize,
    sessions: HashMap<SessionId, PartialMessage>,
    abandoned: u64,
}

impl FragmentAssembler {
    /// Create an assembler that refuses messages larger than
    /// `max_message_size` bytes.
    #[must_use]
    pub fn new(max_message_size: NonZeroUsize) -> Self {
        Self {
            max_message_size,
            sessions: HashMap::new(),
            abandoned: 0,
        }
    }

    /// Feed one fragment.
    ///
    /// Returns `Ok(Some(_))` when the fragment completes a message and
    /// `Ok(None)` while more fragments are required.
    ///
    /// A BEGIN or unfragmented delivery on a session that still holds a
    /// partial message means the rest of that message was lost; the partial
    /// data is discarded and counted in [`abandoned`](Self::abandoned).
    ///
    /// # Errors
    ///
    /// Returns [`AssemblyError::OrphanFragment`] for a continuation with no
    /// open message and [`AssemblyError::MessageTooLarge`] when the payload
    /// would grow past the configured cap.
    pub fn push(
        &mut self,
        buffer: &[u8],
        header: &FragmentHeader,
    ) -> Result<Option<Bytes>, AssemblyError> {
        let session_id = header.session_id();
        let flags = header.flags();

        if flags.is_begin() {
            if self.sessions.remove(&session_id).is_some() {
                self.abandoned += 1;
            }
            self.check_limit(session_id, buffer.len())?;
            if flags.is_end() {
                return Ok(Some(Bytes::copy_from_slice(buffer)));
            }
            self.sessions.insert(session_id, PartialMessage::new(buffer));
            return Ok(None);
        }

        let Entry::Occupied(mut occupied) = self.sessions.entry(session_id) else {
            return Err(AssemblyError::OrphanFragment { session_id });
        };
        let attempted = occupied.get().len().saturating_add(buffer.len());
        if attempted > self.max_message_size.get() {
            occupied.remove();
            return Err(AssemblyError::MessageTooLarge {
                session_id,
                attempted,
                limit: self.max_message_size,
            });
        }
        occupied.get_mut().push(buffer);
        if flags.is_end() {
            Ok(Some(occupied.remove().into_message()))
        } else {
            Ok(None)
        }
    }

    /// Discard any partial message held for `session_id`, returning whether
    /// one existed. Call this when the session's image goes away.
    pub fn free_session(&mut self, session_id: SessionId) -> bool {
        self.sessions.remove(&session_id).is_some()
    }

    /// Number of sessions holding a partial message.
    #[must_use]
    pub fn buffered_len(&self) -> usize { self.sessions.len() }

    /// Number of fragments buffered for `session_id`.
    #[must_use]
    pub fn buffered_fragments(&self, session_id: SessionId) -> usize {
        self.sessions
            .get(&session_id)
            .map_or(0, |partial| partial.fragments)
    }

    /// Partial messages discarded because a new message began on the same
    /// session before they completed.
    #[must_use]
    pub fn abandoned(&self) -> u64 { self.abandoned }

    /// Return the reassembly cap.
    #[must_use]
    pub fn max_message_size(&self) -> NonZeroUsize { self.max_message_size }

    fn check_limit(&self, session_id: SessionId, attempted: usize) -> Result<(), AssemblyError> {
        if attempted > self.max_message_size.get() {
            return Err(AssemblyError::MessageTooLarge {
                session_id,
                attempted,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
