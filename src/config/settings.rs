//! Plain-data bridge settings suitable for configuration files.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use super::{
    ConfigError,
    DEFAULT_BUFFER_CAPACITY,
    DEFAULT_FRAGMENT_LIMIT,
    DEFAULT_MAX_MESSAGE_SIZE,
    TransportConfig,
};
use crate::{
    idle::{BackoffIdleConfig, BackoffIdleStrategy},
    transport::StreamId,
};

/// Back-off tuning with park periods in microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Busy spins before yielding.
    pub max_spins: u32,
    /// Task yields before parking.
    pub max_yields: u32,
    /// First park period in microseconds.
    pub min_park_us: u64,
    /// Longest park period in microseconds.
    pub max_park_us: u64,
}

impl Default for BackoffSettings {
    fn default() -> Self { Self::from(BackoffIdleConfig::default()) }
}

impl From<BackoffIdleConfig> for BackoffSettings {
    fn from(config: BackoffIdleConfig) -> Self {
        Self {
            max_spins: config.max_spins,
            max_yields: config.max_yields,
            min_park_us: u64::try_from(config.min_park.as_micros()).unwrap_or(u64::MAX),
            max_park_us: u64::try_from(config.max_park.as_micros()).unwrap_or(u64::MAX),
        }
    }
}

impl From<BackoffSettings> for BackoffIdleConfig {
    fn from(settings: BackoffSettings) -> Self {
        Self {
            max_spins: settings.max_spins,
            max_yields: settings.max_yields,
            min_park: Duration::from_micros(settings.min_park_us),
            max_park: Duration::from_micros(settings.max_park_us),
        }
    }
}

/// Serialisable description of one bridged stream.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use wirebridge::{config::BridgeSettings, transport::memory::MemoryTransport};
///
/// let settings: BridgeSettings =
///     serde_json::from_str(r#"{ "channel": "memory:prices", "stream_id": 10 }"#)
///         .expect("valid json");
/// let config = settings
///     .into_config(Arc::new(MemoryTransport::new()))
///     .expect("valid settings");
/// assert_eq!(config.stream_id().get(), 10);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Channel descriptor passed to the transport.
    pub channel: String,
    /// Stream id within the channel.
    pub stream_id: i32,
    /// Producer send buffer capacity in bytes.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Most fragments handed over by one poll.
    #[serde(default = "default_fragment_limit")]
    pub fragment_limit: usize,
    /// Cap on a reassembled message in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Idle back-off tuning.
    #[serde(default)]
    pub backoff: BackoffSettings,
}

fn default_buffer_capacity() -> usize { DEFAULT_BUFFER_CAPACITY }

fn default_fragment_limit() -> usize { DEFAULT_FRAGMENT_LIMIT }

fn default_max_message_size() -> usize { DEFAULT_MAX_MESSAGE_SIZE }

impl BridgeSettings {
    /// Create settings for `channel` and `stream_id` with every other value
    /// at its default.
    #[must_use]
    pub fn new(channel: impl Into<String>, stream_id: i32) -> Self {
        Self {
            channel: channel.into(),
            stream_id,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            backoff: BackoffSettings::default(),
        }
    }

    /// Check the settings without building a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyChannel`] for a blank channel and
    /// [`ConfigError::InvalidCapacity`] for any zero size or count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel.trim().is_empty() {
            return Err(ConfigError::EmptyChannel);
        }
        for (field, value) in [
            ("buffer_capacity", self.buffer_capacity),
            ("fragment_limit", self.fragment_limit),
            ("max_message_size", self.max_message_size),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidCapacity { field, value });
            }
        }
        Ok(())
    }

    /// Build a [`TransportConfig`] for `client` using a back-off idle
    /// strategy tuned by [`backoff`](Self::backoff).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when [`validate`](Self::validate) fails.
    pub fn into_config<C>(self, client: Arc<C>) -> Result<TransportConfig<C>, ConfigError> {
        self.validate()?;
        TransportConfig::builder(client)
            .channel(self.channel)
            .stream_id(StreamId::new(self.stream_id))
            .buffer_capacity(self.buffer_capacity)
            .fragment_limit(self.fragment_limit)
            .max_message_size(self.max_message_size)
            .idle_strategy(BackoffIdleStrategy::new(self.backoff.into()))
            .build()
    }
}
