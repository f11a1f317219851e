//! Span and event helpers for bridge tasks.
//!
//! These helpers centralise span creation with dynamic level selection,
//! keeping instrumentation out of the bridges' hot loops.

use std::fmt::Write as _;

use tracing::{Level, Span};

use crate::{tracing_config::TracingConfig, transport::StreamId};

/// Bytes shown by a payload preview.
const PREVIEW_LEN: usize = 16;

/// Create a tracing span at a dynamically selected level.
///
/// Each branch calls the corresponding `tracing::<level>_span!` macro so the
/// span metadata is statically known per branch while the branch selection
/// is dynamic.
macro_rules! dynamic_span {
    ($level:expr, $name:expr $(, $($field:tt)*)?) => {
        match $level {
            Level::ERROR => tracing::error_span!($name $(, $($field)*)?),
            Level::WARN  => tracing::warn_span!($name $(, $($field)*)?),
            Level::INFO  => tracing::info_span!($name $(, $($field)*)?),
            Level::DEBUG => tracing::debug_span!($name $(, $($field)*)?),
            Level::TRACE => tracing::trace_span!($name $(, $($field)*)?),
        }
    };
}

/// Emit an event at a dynamically selected level.
macro_rules! dynamic_event {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::ERROR => tracing::error!($($arg)+),
            Level::WARN  => tracing::warn!($($arg)+),
            Level::INFO  => tracing::info!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            Level::TRACE => tracing::trace!($($arg)+),
        }
    };
}

/// Create the span a producer bridge runs in.
pub(crate) fn producer_span(config: &TracingConfig, channel: &str, stream_id: StreamId) -> Span {
    dynamic_span!(
        config.span_level,
        "bridge.producer",
        channel = channel,
        stream.id = stream_id.get()
    )
}

/// Create the span a consumer bridge runs in.
pub(crate) fn consumer_span(config: &TracingConfig, channel: &str, stream_id: StreamId) -> Span {
    dynamic_span!(
        config.span_level,
        "bridge.consumer",
        channel = channel,
        stream.id = stream_id.get()
    )
}

/// Record one message crossing the bridge.
pub(crate) fn emit_message_event(config: &TracingConfig, action: &'static str, payload: &[u8]) {
    if config.payload_preview {
        let preview = payload_preview(payload);
        dynamic_event!(
            config.message_level,
            bytes = payload.len(),
            payload = %preview,
            "message {action}"
        );
    } else {
        dynamic_event!(config.message_level, bytes = payload.len(), "message {action}");
    }
}

/// Render up to the first sixteen bytes of `payload` as hex.
pub(crate) fn payload_preview(payload: &[u8]) -> String {
    let shown = &payload[..payload.len().min(PREVIEW_LEN)];
    let mut out = String::with_capacity(shown.len() * 2 + 3);
    for byte in shown {
        let _ = write!(out, "{byte:02x}");
    }
    if payload.len() > PREVIEW_LEN {
        out.push_str("...");
    }
    out
}
