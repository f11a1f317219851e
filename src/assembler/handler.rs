//! [`FragmentHandler`] adapter that feeds an assembler.

use bytes::Bytes;
use tracing::{trace, warn};

use super::{AssemblyError, FragmentAssembler};
use crate::transport::{FragmentHandler, FragmentHeader};

/// Handler that pushes each polled fragment through a [`FragmentAssembler`]
/// and hands complete messages to `sink`.
///
/// Fragments the assembler rejects are logged and counted; they never reach
/// the sink.
pub struct AssemblingHandler<'a, F> {
    assembler: &'a mut FragmentAssembler,
    sink: F,
    delivered: u64,
    dropped: u64,
}

impl<'a, F> AssemblingHandler<'a, F>
where
    F: FnMut(Bytes),
{
    /// Wrap `assembler`, forwarding complete messages to `sink`.
    pub fn new(assembler: &'a mut FragmentAssembler, sink: F) -> Self {
        Self {
            assembler,
            sink,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Messages handed to the sink so far.
    #[must_use]
    pub fn delivered(&self) -> u64 { self.delivered }

    /// Fragments discarded so far.
    #[must_use]
    pub fn dropped(&self) -> u64 { self.dropped }
}

impl<F> FragmentHandler for AssemblingHandler<'_, F>
where
    F: FnMut(Bytes),
{
    fn on_fragment(&mut self, buffer: &[u8], header: &FragmentHeader) {
        match self.assembler.push(buffer, header) {
            Ok(Some(message)) => {
                trace!(
                    session_id = %header.session_id(),
                    bytes = message.len(),
                    "message assembled"
                );
                self.delivered += 1;
                (self.sink)(message);
            }
            Ok(None) => {}
            Err(error @ AssemblyError::OrphanFragment { .. }) => {
                self.dropped += 1;
                warn!(%error, flags = %header.flags(), "dropping fragment");
            }
            Err(error @ AssemblyError::MessageTooLarge { .. }) => {
                self.dropped += 1;
                warn!(%error, "dropping oversized message");
            }
        }
    }
}
