//! Builder for [`TransportConfig`].

use std::{num::NonZeroUsize, sync::Arc};

use super::{
    ConfigError,
    DEFAULT_BUFFER_CAPACITY,
    DEFAULT_FRAGMENT_LIMIT,
    DEFAULT_MAX_MESSAGE_SIZE,
    TransportConfig,
};
use crate::{
    idle::{BackoffIdleStrategy, IdleStrategy},
    tracing_config::TracingConfig,
    transport::StreamId,
};

/// Builder for [`TransportConfig`].
///
/// `channel` and `stream_id` are required; everything else has a default.
pub struct TransportConfigBuilder<C, S = BackoffIdleStrategy> {
    client: Arc<C>,
    channel: Option<String>,
    stream_id: Option<StreamId>,
    buffer_capacity: usize,
    fragment_limit: usize,
    max_message_size: usize,
    idle_strategy: S,
    tracing: TracingConfig,
}

impl<C> TransportConfigBuilder<C, BackoffIdleStrategy> {
    pub(crate) fn new(client: Arc<C>) -> Self {
        Self {
            client,
            channel: None,
            stream_id: None,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_strategy: BackoffIdleStrategy::default(),
            tracing: TracingConfig::default(),
        }
    }
}

impl<C, S> TransportConfigBuilder<C, S>
where
    S: IdleStrategy + Clone,
{
    /// Set the channel descriptor passed to the transport.
    #[must_use]
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Set the stream id within the channel.
    #[must_use]
    pub fn stream_id(mut self, stream_id: StreamId) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Set the producer's send buffer capacity in bytes. Messages larger than
    /// this fail the producer bridge.
    #[must_use]
    pub fn buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    /// Set the most fragments one poll may deliver.
    #[must_use]
    pub fn fragment_limit(mut self, fragments: usize) -> Self {
        self.fragment_limit = fragments;
        self
    }

    /// Set the cap on a reassembled inbound message in bytes.
    #[must_use]
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Configure tracing span and event levels.
    #[must_use]
    pub fn tracing_config(mut self, config: TracingConfig) -> Self {
        self.tracing = config;
        self
    }

    /// Replace the idle strategy prototype.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use wirebridge::{
    ///     TransportConfig,
    ///     idle::YieldingIdleStrategy,
    ///     transport::{StreamId, memory::MemoryTransport},
    /// };
    ///
    /// let config = TransportConfig::builder(Arc::new(MemoryTransport::new()))
    ///     .channel("memory:yield")
    ///     .stream_id(StreamId::new(1))
    ///     .idle_strategy(YieldingIdleStrategy)
    ///     .build()
    ///     .expect("valid config");
    /// let _ = config;
    /// ```
    #[must_use]
    pub fn idle_strategy<S2>(self, idle_strategy: S2) -> TransportConfigBuilder<C, S2>
    where
        S2: IdleStrategy + Clone,
    {
        TransportConfigBuilder {
            client: self.client,
            channel: self.channel,
            stream_id: self.stream_id,
            buffer_capacity: self.buffer_capacity,
            fragment_limit: self.fragment_limit,
            max_message_size: self.max_message_size,
            idle_strategy,
            tracing: self.tracing,
        }
    }

    /// Validate the settings and produce a [`TransportConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the channel or stream id is missing, the
    /// channel is blank, or any capacity is zero.
    pub fn build(self) -> Result<TransportConfig<C, S>, ConfigError> {
        let channel = self.channel.ok_or(ConfigError::MissingChannel)?;
        if channel.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        let stream_id = self.stream_id.ok_or(ConfigError::MissingStreamId)?;
        Ok(TransportConfig {
            client: self.client,
            channel: Arc::from(channel),
            stream_id,
            buffer_capacity: non_zero("buffer_capacity", self.buffer_capacity)?,
            fragment_limit: non_zero("fragment_limit", self.fragment_limit)?,
            max_message_size: non_zero("max_message_size", self.max_message_size)?,
            idle_strategy: self.idle_strategy,
            tracing: self.tracing,
        })
    }
}

fn non_zero(field: &'static str, value: usize) -> Result<NonZeroUsize, ConfigError> {
    NonZeroUsize::new(value).ok_or(ConfigError::InvalidCapacity { field, value })
}
