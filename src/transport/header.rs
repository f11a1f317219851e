use derive_more::{Display, From, Into};

use super::Position;

/// Identifier of a logical stream multiplexed over a channel.
///
/// # Examples
///
/// ```
/// use wirebridge::transport::StreamId;
/// let id = StreamId::new(10);
/// assert_eq!(id.get(), 10);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Into)]
#[display("{_0}")]
pub struct StreamId(i32);

impl StreamId {
    /// Create a new stream identifier.
    #[must_use]
    pub const fn new(value: i32) -> Self { Self(value) }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> i32 { self.0 }
}

/// Identifier of one publisher's delivery session on a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, From, Into)]
#[display("{_0}")]
pub struct SessionId(i32);

impl SessionId {
    /// Create a new session identifier.
    #[must_use]
    pub const fn new(value: i32) -> Self { Self(value) }

    /// Return the inner numeric identifier.
    #[must_use]
    pub const fn get(self) -> i32 { self.0 }
}

/// Begin/end markers carried by every fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display("{_0:#04x}")]
pub struct FragmentFlags(u8);

impl FragmentFlags {
    /// First fragment of a message.
    pub const BEGIN: Self = Self(0x80);
    /// Last fragment of a message.
    pub const END: Self = Self(0x40);
    /// A message that fits in a single fragment.
    pub const UNFRAGMENTED: Self = Self(0x80 | 0x40);
    /// A fragment in the middle of a message.
    pub const MIDDLE: Self = Self(0);

    /// Wrap raw flag bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self { Self(bits) }

    /// Return the raw flag bits.
    #[must_use]
    pub const fn bits(self) -> u8 { self.0 }

    /// Whether the BEGIN bit is set.
    #[must_use]
    pub const fn is_begin(self) -> bool { self.0 & Self::BEGIN.0 != 0 }

    /// Whether the END bit is set.
    #[must_use]
    pub const fn is_end(self) -> bool { self.0 & Self::END.0 != 0 }

    /// Whether both BEGIN and END are set.
    #[must_use]
    pub const fn is_unfragmented(self) -> bool { self.is_begin() && self.is_end() }

    /// Select the flags for fragment `index` of `count`.
    #[must_use]
    pub const fn for_position(index: usize, count: usize) -> Self {
        let mut bits = 0;
        if index == 0 {
            bits |= Self::BEGIN.0;
        }
        if index + 1 >= count {
            bits |= Self::END.0;
        }
        Self(bits)
    }
}

/// Metadata delivered alongside each fragment.
///
/// # Examples
///
/// ```
/// use wirebridge::transport::{FragmentFlags, FragmentHeader, SessionId, StreamId};
/// let header = FragmentHeader::new(SessionId::new(7), StreamId::new(10), FragmentFlags::BEGIN);
/// assert_eq!(header.session_id().get(), 7);
/// assert!(header.flags().is_begin());
/// assert!(!header.flags().is_end());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FragmentHeader {
    session_id: SessionId,
    stream_id: StreamId,
    flags: FragmentFlags,
    position: Position,
}

impl FragmentHeader {
    /// Create a header at position zero.
    #[must_use]
    pub const fn new(session_id: SessionId, stream_id: StreamId, flags: FragmentFlags) -> Self {
        Self {
            session_id,
            stream_id,
            flags,
            position: Position::new(0),
        }
    }

    /// Attach the stream position reached after this fragment.
    #[must_use]
    pub const fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Return the delivery session.
    #[must_use]
    pub const fn session_id(&self) -> SessionId { self.session_id }

    /// Return the stream the fragment arrived on.
    #[must_use]
    pub const fn stream_id(&self) -> StreamId { self.stream_id }

    /// Return the begin/end markers.
    #[must_use]
    pub const fn flags(&self) -> FragmentFlags { self.flags }

    /// Return the stream position reached after this fragment.
    #[must_use]
    pub const fn position(&self) -> Position { self.position }
}
