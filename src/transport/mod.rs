//! Boundary with the external publish/subscribe transport.
//!
//! The bridges never depend on a concrete transport. They drive the traits in
//! this module, which model a non-blocking, poll-based API: offers return
//! immediately with an [`OfferOutcome`], receives are polled with a
//! [`FragmentHandler`] callback, and endpoints report their connectivity
//! through [`Endpoint::is_connected`] and [`Endpoint::channel_status`].
//!
//! [`memory::MemoryTransport`] is an in-process implementation used by the
//! tests and demos.

mod guard;
mod header;
pub mod memory;
mod status;

use std::sync::Arc;

pub use guard::EndpointGuard;
pub use header::{FragmentFlags, FragmentHeader, SessionId, StreamId};
pub use status::{
    ADMIN_ACTION,
    BACK_PRESSURED,
    CLOSED,
    ConnectionStatus,
    MAX_POSITION_EXCEEDED,
    NOT_CONNECTED,
    OfferOutcome,
    Position,
    TerminalReason,
};
use thiserror::Error;

/// Errors raised while registering endpoints with a transport.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The client has been closed.
    #[error("transport client is closed")]
    ClientClosed,
    /// The channel descriptor could not be used.
    #[error("invalid channel `{0}`")]
    InvalidChannel(String),
    /// The transport refused the registration.
    #[error("registration rejected for {channel} stream {stream_id}: {reason}")]
    Rejected {
        channel: String,
        stream_id: StreamId,
        reason: String,
    },
    /// A raw offer result did not match any known code.
    #[error("unknown offer code {0}")]
    UnknownOfferCode(i64),
}

/// Callback invoked when a publisher's image appears on or leaves a
/// subscription.
///
/// Transports may invoke handlers from their own threads.
pub type ImageHandler = Arc<dyn Fn(SessionId) + Send + Sync + 'static>;

/// State shared by publications and subscriptions.
///
/// `close` must be idempotent: [`EndpointGuard`] calls it on drop regardless
/// of whether the endpoint was already closed.
#[cfg_attr(test, mockall::automock)]
pub trait Endpoint: Send {
    /// Whether the endpoint can currently exchange data with a peer.
    fn is_connected(&self) -> bool;

    /// Classify the endpoint's channel at this instant.
    fn channel_status(&self) -> ConnectionStatus;

    /// Release the endpoint.
    fn close(&mut self);
}

/// Sending side of a stream.
pub trait Publication: Endpoint {
    /// Attempt to hand `payload` to the transport without blocking.
    fn offer(&mut self, payload: &[u8]) -> OfferOutcome;
}

/// Receiving side of a stream.
pub trait Subscription: Endpoint {
    /// Deliver at most `fragment_limit` pending fragments to `handler`,
    /// returning how many were delivered.
    ///
    /// The handler runs synchronously inside this call.
    fn poll<H>(&mut self, handler: &mut H, fragment_limit: usize) -> usize
    where
        H: FragmentHandler + ?Sized;
}

/// Receives fragments during [`Subscription::poll`].
pub trait FragmentHandler {
    /// Handle one fragment. `buffer` is only valid for the duration of the
    /// call.
    fn on_fragment(&mut self, buffer: &[u8], header: &FragmentHeader);
}

impl<F> FragmentHandler for F
where
    F: FnMut(&[u8], &FragmentHeader),
{
    fn on_fragment(&mut self, buffer: &[u8], header: &FragmentHeader) { self(buffer, header); }
}

/// A connected transport client able to create endpoints.
///
/// The client is shared read-only between bridges, so implementations must be
/// safe for concurrent use.
pub trait TransportClient: Send + Sync + 'static {
    /// Publication type created by this client.
    type Publication: Publication + Sync + 'static;
    /// Subscription type created by this client.
    type Subscription: Subscription + Sync + 'static;

    /// Register a publication that only the caller will write to.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport refuses the registration.
    fn add_exclusive_publication(
        &self,
        channel: &str,
        stream_id: StreamId,
    ) -> Result<Self::Publication, TransportError>;

    /// Register a subscription and the callbacks fired as publisher images
    /// come and go.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport refuses the registration.
    fn add_subscription(
        &self,
        channel: &str,
        stream_id: StreamId,
        on_available: ImageHandler,
        on_unavailable: ImageHandler,
    ) -> Result<Self::Subscription, TransportError>;
}
