//! Bridge configuration.
//!
//! [`TransportConfig`] bundles the transport client, the channel and stream to
//! bridge, buffer sizes, the idle strategy prototype each bridge clones, and
//! the tracing levels. Build one with [`TransportConfig::builder`] or from
//! deserialised [`BridgeSettings`].

mod builder;
mod settings;

use std::{fmt, num::NonZeroUsize, sync::Arc};

pub use builder::TransportConfigBuilder;
pub use settings::{BackoffSettings, BridgeSettings};
use thiserror::Error;

use crate::{idle::BackoffIdleStrategy, tracing_config::TracingConfig, transport::StreamId};

/// Default capacity of the producer's send buffer in bytes.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1024;
/// Default maximum fragments handed over by one poll.
pub const DEFAULT_FRAGMENT_LIMIT: usize = 10;
/// Default cap on a reassembled message in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Errors raised while building a [`TransportConfig`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// No channel descriptor was supplied.
    #[error("channel is required")]
    MissingChannel,
    /// The channel descriptor is blank.
    #[error("channel must not be empty")]
    EmptyChannel,
    /// No stream id was supplied.
    #[error("stream id is required")]
    MissingStreamId,
    /// A size or count was zero.
    #[error("{field} must be greater than zero (got {value})")]
    InvalidCapacity { field: &'static str, value: usize },
}

/// Everything a bridge needs to reach its transport.
///
/// `S` is the idle strategy prototype. Each bridge clones it so two bridges
/// built from one config never share back-off state.
pub struct TransportConfig<C, S = BackoffIdleStrategy> {
    pub(crate) client: Arc<C>,
    pub(crate) channel: Arc<str>,
    pub(crate) stream_id: StreamId,
    pub(crate) buffer_capacity: NonZeroUsize,
    pub(crate) fragment_limit: NonZeroUsize,
    pub(crate) max_message_size: NonZeroUsize,
    pub(crate) idle_strategy: S,
    pub(crate) tracing: TracingConfig,
}

impl<C> TransportConfig<C, BackoffIdleStrategy> {
    /// Start building a configuration for `client`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use wirebridge::{
    ///     TransportConfig,
    ///     transport::{StreamId, memory::MemoryTransport},
    /// };
    ///
    /// let config = TransportConfig::builder(Arc::new(MemoryTransport::new()))
    ///     .channel("memory:demo")
    ///     .stream_id(StreamId::new(10))
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.buffer_capacity(), 1024);
    /// ```
    #[must_use]
    pub fn builder(client: Arc<C>) -> TransportConfigBuilder<C, BackoffIdleStrategy> {
        TransportConfigBuilder::new(client)
    }
}

impl<C, S> TransportConfig<C, S> {
    /// Return the shared transport client.
    #[must_use]
    pub fn client(&self) -> &Arc<C> { &self.client }

    /// Return the channel descriptor.
    #[must_use]
    pub fn channel(&self) -> &str { &self.channel }

    /// Return the stream id.
    #[must_use]
    pub fn stream_id(&self) -> StreamId { self.stream_id }

    /// Return the producer's send buffer capacity in bytes.
    #[must_use]
    pub fn buffer_capacity(&self) -> usize { self.buffer_capacity.get() }

    /// Return the most fragments one poll may deliver.
    #[must_use]
    pub fn fragment_limit(&self) -> usize { self.fragment_limit.get() }

    /// Return the cap on a reassembled message in bytes.
    #[must_use]
    pub fn max_message_size(&self) -> NonZeroUsize { self.max_message_size }

    /// Return the idle strategy prototype.
    #[must_use]
    pub fn idle_strategy(&self) -> &S { &self.idle_strategy }

    /// Return the tracing configuration.
    #[must_use]
    pub fn tracing(&self) -> &TracingConfig { &self.tracing }

    /// Replace the tracing configuration of an already built config.
    #[must_use]
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }
}

impl<C, S: Clone> Clone for TransportConfig<C, S> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            channel: Arc::clone(&self.channel),
            stream_id: self.stream_id,
            buffer_capacity: self.buffer_capacity,
            fragment_limit: self.fragment_limit,
            max_message_size: self.max_message_size,
            idle_strategy: self.idle_strategy.clone(),
            tracing: self.tracing.clone(),
        }
    }
}

impl<C, S: fmt::Debug> fmt::Debug for TransportConfig<C, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("channel", &self.channel)
            .field("stream_id", &self.stream_id)
            .field("buffer_capacity", &self.buffer_capacity)
            .field("fragment_limit", &self.fragment_limit)
            .field("max_message_size", &self.max_message_size)
            .field("idle_strategy", &self.idle_strategy)
            .field("tracing", &self.tracing)
            .finish_non_exhaustive()
    }
}
