//! In-process transport used by tests and demos.
//!
//! [`MemoryTransport`] keeps one shared buffer set per (channel, stream) pair.
//! It mirrors the behaviour the bridges rely on from a real transport:
//!
//! - publications report connected once a subscription exists and
//!   subscriptions once a publication exists;
//! - payloads larger than the configured MTU are split into BEGIN, middle and
//!   END fragments;
//! - every subscription owns a bounded term buffer, and an offer that does not
//!   fit in every buffer returns [`OfferOutcome::BackPressured`];
//! - an offer whose fragments need more than a whole term buffer returns
//!   [`OfferOutcome::MaxPositionExceeded`], since it can never be accepted;
//! - closing a publication enqueues an image-unavailable notification behind
//!   the fragments it already delivered;
//! - closing the transport turns every endpoint terminal.
//!
//! Handlers run without any internal lock held.

mod stream;

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use log::{debug, info, warn};
use stream::{Append, Delivery, StreamState, SubscriberSlot};

use super::{
    ConnectionStatus,
    Endpoint,
    FragmentHandler,
    ImageHandler,
    OfferOutcome,
    Position,
    Publication,
    SessionId,
    StreamId,
    Subscription,
    TerminalReason,
    TransportClient,
    TransportError,
};

/// Default largest fragment payload, matching a typical UDP MTU budget.
pub const DEFAULT_MTU: usize = 1408;
/// Default per-subscription buffer size in bytes.
pub const DEFAULT_TERM_CAPACITY: usize = 64 * 1024;

/// Sizing of the memory transport's fragments and buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryTransportConfig {
    /// Largest payload carried by a single fragment.
    pub mtu: NonZeroUsize,
    /// Bytes each subscription may buffer before offers are back-pressured.
    pub term_capacity: NonZeroUsize,
}

impl Default for MemoryTransportConfig {
    fn default() -> Self {
        Self {
            mtu: NonZeroUsize::new(DEFAULT_MTU).unwrap_or(NonZeroUsize::MIN),
            term_capacity: NonZeroUsize::new(DEFAULT_TERM_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

type StreamKey = (Arc<str>, StreamId);
type SharedStream = Arc<Mutex<StreamState>>;

struct Hub {
    config: MemoryTransportConfig,
    streams: DashMap<StreamKey, SharedStream>,
    next_session: AtomicI32,
    next_subscriber: AtomicU64,
    closed: AtomicBool,
}

impl Hub {
    fn stream(&self, channel: &str, stream_id: StreamId) -> SharedStream {
        self.streams
            .entry((Arc::from(channel), stream_id))
            .or_default()
            .clone()
    }

    fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }
}

fn lock(stream: &Mutex<StreamState>) -> MutexGuard<'_, StreamState> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared in-process transport client.
///
/// Cloning yields another handle to the same transport.
///
/// # Examples
///
/// ```
/// use wirebridge::transport::{
///     Endpoint,
///     OfferOutcome,
///     Publication,
///     StreamId,
///     TransportClient,
///     memory::MemoryTransport,
/// };
///
/// let transport = MemoryTransport::new();
/// let mut publication = transport
///     .add_exclusive_publication("memory:demo", StreamId::new(1))
///     .expect("register publication");
/// assert!(!publication.is_connected());
/// assert_eq!(publication.offer(b"nobody listens"), OfferOutcome::NotConnected);
/// ```
#[derive(Clone)]
pub struct MemoryTransport {
    hub: Arc<Hub>,
}

impl Default for MemoryTransport {
    fn default() -> Self { Self::new() }
}

impl MemoryTransport {
    /// Create a transport with default sizing.
    #[must_use]
    pub fn new() -> Self { Self::with_config(MemoryTransportConfig::default()) }

    /// Create a transport with explicit sizing.
    #[must_use]
    pub fn with_config(config: MemoryTransportConfig) -> Self {
        Self {
            hub: Arc::new(Hub {
                config,
                streams: DashMap::new(),
                next_session: AtomicI32::new(1),
                next_subscriber: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Return the transport sizing.
    #[must_use]
    pub fn config(&self) -> MemoryTransportConfig { self.hub.config }

    /// Close the transport. Every endpoint becomes terminal and further
    /// registrations fail.
    pub fn close(&self) {
        if !self.hub.closed.swap(true, Ordering::AcqRel) {
            info!("memory transport closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.hub.is_closed() }
}

impl TransportClient for MemoryTransport {
    type Publication = MemoryPublication;
    type Subscription = MemorySubscription;

    fn add_exclusive_publication(
        &self,
        channel: &str,
        stream_id: StreamId,
    ) -> Result<Self::Publication, TransportError> {
        if self.hub.is_closed() {
            return Err(TransportError::ClientClosed);
        }
        if channel.is_empty() {
            return Err(TransportError::InvalidChannel(channel.to_owned()));
        }
        let session_id = SessionId::new(self.hub.next_session.fetch_add(1, Ordering::Relaxed));
        let stream = self.hub.stream(channel, stream_id);
        let handlers: Vec<ImageHandler> = {
            let mut state = lock(&stream);
            state.publications.push(session_id);
            state
                .subscribers
                .values()
                .map(|slot| Arc::clone(&slot.on_available))
                .collect()
        };
        for handler in handlers {
            handler(session_id);
        }
        debug!("publication added: channel={channel}, stream_id={stream_id}, session_id={session_id}");
        Ok(MemoryPublication {
            hub: Arc::clone(&self.hub),
            stream,
            stream_id,
            session_id,
            position: 0,
            closed: false,
        })
    }

    fn add_subscription(
        &self,
        channel: &str,
        stream_id: StreamId,
        on_available: ImageHandler,
        on_unavailable: ImageHandler,
    ) -> Result<Self::Subscription, TransportError> {
        if self.hub.is_closed() {
            return Err(TransportError::ClientClosed);
        }
        if channel.is_empty() {
            return Err(TransportError::InvalidChannel(channel.to_owned()));
        }
        let id = self.hub.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let stream = self.hub.stream(channel, stream_id);
        let images = {
            let mut state = lock(&stream);
            state.subscribers.insert(
                id,
                SubscriberSlot::new(Arc::clone(&on_available), on_unavailable),
            );
            state.publications.clone()
        };
        for session_id in images {
            on_available(session_id);
        }
        debug!("subscription added: channel={channel}, stream_id={stream_id}, id={id}");
        Ok(MemorySubscription {
            hub: Arc::clone(&self.hub),
            stream,
            id,
            closed: false,
        })
    }
}

/// Exclusive publication on a [`MemoryTransport`] stream.
pub struct MemoryPublication {
    hub: Arc<Hub>,
    stream: SharedStream,
    stream_id: StreamId,
    session_id: SessionId,
    position: u64,
    closed: bool,
}

impl MemoryPublication {
    /// Session identifier stamped on every fragment from this publication.
    #[must_use]
    pub fn session_id(&self) -> SessionId { self.session_id }

    /// Whether [`close`](Endpoint::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed }
}

impl Endpoint for MemoryPublication {
    fn is_connected(&self) -> bool {
        !self.closed && !self.hub.is_closed() && !lock(&self.stream).subscribers.is_empty()
    }

    fn channel_status(&self) -> ConnectionStatus {
        if self.closed || self.hub.is_closed() {
            ConnectionStatus::Terminal(TerminalReason::Closing)
        } else if self.is_connected() {
            ConnectionStatus::Active
        } else {
            ConnectionStatus::Pending
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        lock(&self.stream).close_image(self.session_id);
        debug!(
            "publication closed: stream_id={}, session_id={}",
            self.stream_id, self.session_id
        );
    }
}

impl Publication for MemoryPublication {
    fn offer(&mut self, payload: &[u8]) -> OfferOutcome {
        if self.closed || self.hub.is_closed() {
            return OfferOutcome::Closed;
        }
        let MemoryTransportConfig { mtu, term_capacity } = self.hub.config;
        let mut state = lock(&self.stream);
        if state.subscribers.is_empty() {
            return OfferOutcome::NotConnected;
        }
        match state.append(
            self.session_id,
            self.stream_id,
            payload,
            mtu,
            term_capacity,
            &mut self.position,
        ) {
            Append::Appended => OfferOutcome::Accepted(Position::new(self.position)),
            Append::NoRoom => OfferOutcome::BackPressured,
            Append::ExceedsTerm { charge } => {
                warn!(
                    "offer exceeds term capacity: session_id={}, bytes={}, charge={charge}, \
                     term_capacity={term_capacity}",
                    self.session_id,
                    payload.len()
                );
                OfferOutcome::MaxPositionExceeded
            }
        }
    }
}

impl Drop for MemoryPublication {
    fn drop(&mut self) { self.close(); }
}

/// Subscription on a [`MemoryTransport`] stream.
pub struct MemorySubscription {
    hub: Arc<Hub>,
    stream: SharedStream,
    id: u64,
    closed: bool,
}

impl Endpoint for MemorySubscription {
    fn is_connected(&self) -> bool {
        if self.closed || self.hub.is_closed() {
            return false;
        }
        let state = lock(&self.stream);
        !state.publications.is_empty()
            || state
                .subscribers
                .get(&self.id)
                .is_some_and(SubscriberSlot::has_pending)
    }

    fn channel_status(&self) -> ConnectionStatus {
        if self.closed || self.hub.is_closed() {
            ConnectionStatus::Terminal(TerminalReason::Closing)
        } else if self.is_connected() {
            ConnectionStatus::Active
        } else {
            ConnectionStatus::Pending
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        lock(&self.stream).subscribers.remove(&self.id);
        debug!("subscription closed: id={}", self.id);
    }
}

impl Subscription for MemorySubscription {
    fn poll<H>(&mut self, handler: &mut H, fragment_limit: usize) -> usize
    where
        H: FragmentHandler + ?Sized,
    {
        if self.closed {
            return 0;
        }
        let (entries, on_unavailable) = {
            let mut state = lock(&self.stream);
            let Some(slot) = state.subscribers.get_mut(&self.id) else {
                return 0;
            };
            (
                slot.take(fragment_limit),
                Arc::clone(&slot.on_unavailable),
            )
        };
        let mut delivered = 0;
        for entry in entries {
            match entry {
                Delivery::Fragment(frame) => {
                    handler.on_fragment(&frame.payload, &frame.header);
                    delivered += 1;
                }
                Delivery::ImageClosed(session_id) => on_unavailable(session_id),
            }
        }
        delivered
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) { self.close(); }
}

#[cfg(test)]
mod tests;
