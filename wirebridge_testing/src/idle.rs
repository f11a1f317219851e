//! Idle strategy that records every call.

use std::sync::{Arc, Mutex};

use wirebridge::idle::IdleStrategy;

/// One call made on a [`RecordingIdleStrategy`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleCall {
    /// `idle()`, or `idle_with` with a non-positive indicator.
    Idle,
    /// `reset()`, or `idle_with` with a positive indicator.
    Reset,
    /// The indicator passed to `idle_with`.
    Progress(i64),
}

/// Idle strategy that yields to the scheduler and logs each call.
///
/// Clones share one log, so a test can keep a clone while the bridge owns
/// the prototype's copy.
#[derive(Clone, Debug, Default)]
pub struct RecordingIdleStrategy {
    calls: Arc<Mutex<Vec<IdleCall>>>,
}

impl RecordingIdleStrategy {
    /// Create a strategy with an empty log.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Every call recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the log mutex is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<IdleCall> { self.calls.lock().expect("idle log poisoned").clone() }

    /// Number of recorded calls equal to `call`.
    #[must_use]
    pub fn count(&self, call: IdleCall) -> usize {
        self.calls().iter().filter(|recorded| **recorded == call).count()
    }

    fn record(&self, call: IdleCall) { self.calls.lock().expect("idle log poisoned").push(call); }
}

impl IdleStrategy for RecordingIdleStrategy {
    fn idle(&mut self) -> impl Future<Output = ()> + Send {
        self.record(IdleCall::Idle);
        tokio::task::yield_now()
    }

    fn idle_with(&mut self, progress: i64) -> impl Future<Output = ()> + Send {
        self.record(IdleCall::Progress(progress));
        self.record(if progress > 0 {
            IdleCall::Reset
        } else {
            IdleCall::Idle
        });
        tokio::task::yield_now()
    }

    fn reset(&mut self) { self.record(IdleCall::Reset); }

    fn alias(&self) -> &'static str { "recording" }
}
