//! Tracing configuration for bridge tasks.
//!
//! [`TracingConfig`] selects the level of each bridge's lifecycle span and of
//! the per-message events emitted inside it.

use tracing::Level;

/// Controls tracing span levels and per-message events for bridges.
///
/// By default, each bridge runs inside a span at `INFO` level and emits one
/// event per message at `DEBUG` level. Payload previews are disabled.
///
/// Spans are always created at the configured level. When no `tracing`
/// subscriber is installed, span creation is a no-op.
///
/// # Examples
///
/// ```
/// use tracing::Level;
/// use wirebridge::TracingConfig;
///
/// let config = TracingConfig::default()
///     .with_message_level(Level::TRACE)
///     .with_payload_preview(true);
/// assert_eq!(config.message_level(), Level::TRACE);
/// ```
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub(crate) span_level: Level,
    pub(crate) message_level: Level,
    pub(crate) payload_preview: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            span_level: Level::INFO,
            message_level: Level::DEBUG,
            payload_preview: false,
        }
    }
}

impl TracingConfig {
    /// Set the level of the span each bridge task runs in.
    #[must_use]
    pub fn with_span_level(mut self, level: Level) -> Self {
        self.span_level = level;
        self
    }

    /// Set the level of per-message send and receive events.
    #[must_use]
    pub fn with_message_level(mut self, level: Level) -> Self {
        self.message_level = level;
        self
    }

    /// Include a short hex preview of each payload in per-message events.
    #[must_use]
    pub fn with_payload_preview(mut self, enabled: bool) -> Self {
        self.payload_preview = enabled;
        self
    }

    /// Return the bridge span level.
    #[must_use]
    pub fn span_level(&self) -> Level { self.span_level }

    /// Return the per-message event level.
    #[must_use]
    pub fn message_level(&self) -> Level { self.message_level }

    /// Whether payload previews are enabled.
    #[must_use]
    pub fn payload_preview(&self) -> bool { self.payload_preview }
}
