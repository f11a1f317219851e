//! Idle strategies used when a non-blocking operation made no progress.
//!
//! Bridges never block on the transport. Whenever an offer is rejected with a
//! transient code, a connection check comes back negative, or a poll returns
//! no fragments, the bridge calls into its [`IdleStrategy`] instead. A strategy
//! is owned by exactly one bridge task; bridges clone the prototype held in
//! their configuration so back-off state is never shared.

mod backoff;

use std::time::Duration;

pub use backoff::{BackoffIdleConfig, BackoffIdleStrategy, BackoffPhase};

/// Pluggable back-off policy.
pub trait IdleStrategy: Send {
    /// Wait after an attempt that made no progress. Repeated calls may
    /// escalate the wait.
    fn idle(&mut self) -> impl Future<Output = ()> + Send;

    /// Wait according to a signed progress indicator.
    ///
    /// A positive value means work was done and is equivalent to
    /// [`reset`](Self::reset); zero or a negative status code behaves like
    /// [`idle`](Self::idle).
    fn idle_with(&mut self, progress: i64) -> impl Future<Output = ()> + Send {
        async move {
            if progress > 0 {
                self.reset();
            } else {
                self.idle().await;
            }
        }
    }

    /// Return to the most aggressive, lowest-latency level.
    fn reset(&mut self);

    /// Short name used in logs.
    fn alias(&self) -> &'static str;
}

/// Spins on every idle call. Lowest latency, one core fully used.
#[derive(Clone, Copy, Debug, Default)]
pub struct BusySpinIdleStrategy;

impl IdleStrategy for BusySpinIdleStrategy {
    fn idle(&mut self) -> impl Future<Output = ()> + Send {
        std::hint::spin_loop();
        std::future::ready(())
    }

    fn reset(&mut self) {}

    fn alias(&self) -> &'static str { "spin" }
}

/// Yields to the scheduler on every idle call.
#[derive(Clone, Copy, Debug, Default)]
pub struct YieldingIdleStrategy;

impl IdleStrategy for YieldingIdleStrategy {
    fn idle(&mut self) -> impl Future<Output = ()> + Send { tokio::task::yield_now() }

    fn reset(&mut self) {}

    fn alias(&self) -> &'static str { "yield" }
}

/// Sleeps for a fixed period on every idle call.
#[derive(Clone, Copy, Debug)]
pub struct SleepingIdleStrategy {
    period: Duration,
}

impl SleepingIdleStrategy {
    /// Sleep for `period` on each idle call.
    #[must_use]
    pub const fn new(period: Duration) -> Self { Self { period } }

    /// Return the sleep period.
    #[must_use]
    pub const fn period(&self) -> Duration { self.period }
}

impl Default for SleepingIdleStrategy {
    fn default() -> Self { Self::new(Duration::from_millis(1)) }
}

impl IdleStrategy for SleepingIdleStrategy {
    fn idle(&mut self) -> impl Future<Output = ()> + Send { tokio::time::sleep(self.period) }

    fn reset(&mut self) {}

    fn alias(&self) -> &'static str { "sleep" }
}

/// Returns immediately. Only useful when something else paces the loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpIdleStrategy;

impl IdleStrategy for NoOpIdleStrategy {
    fn idle(&mut self) -> impl Future<Output = ()> + Send { std::future::ready(()) }

    fn reset(&mut self) {}

    fn alias(&self) -> &'static str { "noop" }
}
