//! Escalating spin, yield and park back-off.

use std::time::Duration;

use super::IdleStrategy;

/// Tuning for [`BackoffIdleStrategy`].
///
/// Idling escalates through `max_spins` busy spins, then `max_yields` task
/// yields, then sleeps starting at `min_park` and doubling up to `max_park`.
///
/// # Default Values
/// - `max_spins`: 100
/// - `max_yields`: 10
/// - `min_park`: 1 microsecond
/// - `max_park`: 100 microseconds
///
/// # Invariants
/// - `min_park` must not exceed `max_park`
/// - `min_park` must be at least 1 microsecond
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffIdleConfig {
    /// Busy spins before yielding.
    pub max_spins: u32,
    /// Task yields before parking.
    pub max_yields: u32,
    /// First park period.
    pub min_park: Duration,
    /// Longest park period once doubling has saturated.
    pub max_park: Duration,
}

impl Default for BackoffIdleConfig {
    fn default() -> Self {
        Self {
            max_spins: 100,
            max_yields: 10,
            min_park: Duration::from_micros(1),
            max_park: Duration::from_micros(100),
        }
    }
}

impl BackoffIdleConfig {
    /// Clamp park periods to sane bounds and ensure `min_park <= max_park`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use wirebridge::idle::BackoffIdleConfig;
    ///
    /// let cfg = BackoffIdleConfig {
    ///     min_park: Duration::from_micros(50),
    ///     max_park: Duration::ZERO,
    ///     ..BackoffIdleConfig::default()
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.min_park, Duration::from_micros(1));
    /// assert_eq!(normalized.max_park, Duration::from_micros(50));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.min_park = self.min_park.max(Duration::from_micros(1));
        self.max_park = self.max_park.max(Duration::from_micros(1));
        if self.min_park > self.max_park {
            std::mem::swap(&mut self.min_park, &mut self.max_park);
        }
        self
    }
}

/// Current rung of the back-off ladder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffPhase {
    /// Progress was made; the next idle starts the ladder from the bottom.
    NotIdle,
    /// Busy spinning.
    Spinning,
    /// Yielding to the scheduler.
    Yielding,
    /// Sleeping with a doubling period.
    Parking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum IdleStep {
    Spin,
    Yield,
    Park(Duration),
}

/// Adaptive back-off that escalates from spinning to yielding to parking.
///
/// # Examples
///
/// ```
/// use wirebridge::idle::{BackoffIdleConfig, BackoffIdleStrategy, BackoffPhase, IdleStrategy};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut idle = BackoffIdleStrategy::new(BackoffIdleConfig {
///     max_spins: 1,
///     ..BackoffIdleConfig::default()
/// });
/// idle.idle().await;
/// idle.idle().await;
/// assert_eq!(idle.phase(), BackoffPhase::Yielding);
/// idle.reset();
/// assert_eq!(idle.phase(), BackoffPhase::NotIdle);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BackoffIdleStrategy {
    config: BackoffIdleConfig,
    phase: BackoffPhase,
    spins: u32,
    yields: u32,
    park_period: Duration,
}

impl Default for BackoffIdleStrategy {
    fn default() -> Self { Self::new(BackoffIdleConfig::default()) }
}

impl BackoffIdleStrategy {
    /// Create a strategy from `config`, normalising it first.
    #[must_use]
    pub fn new(config: BackoffIdleConfig) -> Self {
        let config = config.normalized();
        debug_assert!(
            config.min_park <= config.max_park,
            "BackoffIdleConfig invariant violated: min_park > max_park"
        );
        Self {
            config,
            phase: BackoffPhase::NotIdle,
            spins: 0,
            yields: 0,
            park_period: config.min_park,
        }
    }

    /// Return the normalised configuration.
    #[must_use]
    pub fn config(&self) -> BackoffIdleConfig { self.config }

    /// Return the current rung of the ladder.
    #[must_use]
    pub fn phase(&self) -> BackoffPhase { self.phase }

    /// Return the period the next park will sleep for.
    #[must_use]
    pub fn park_period(&self) -> Duration { self.park_period }

    fn next_step(&mut self) -> IdleStep {
        match self.phase {
            BackoffPhase::NotIdle | BackoffPhase::Spinning => {
                if self.phase == BackoffPhase::NotIdle {
                    self.phase = BackoffPhase::Spinning;
                    self.spins = 0;
                }
                self.spins += 1;
                if self.spins > self.config.max_spins {
                    self.phase = BackoffPhase::Yielding;
                    self.yields = 0;
                }
                IdleStep::Spin
            }
            BackoffPhase::Yielding => {
                self.yields += 1;
                if self.yields > self.config.max_yields {
                    self.phase = BackoffPhase::Parking;
                    self.park_period = self.config.min_park;
                }
                IdleStep::Yield
            }
            BackoffPhase::Parking => {
                let period = self.park_period;
                self.park_period = period.saturating_mul(2).min(self.config.max_park);
                IdleStep::Park(period)
            }
        }
    }
}

impl IdleStrategy for BackoffIdleStrategy {
    fn idle(&mut self) -> impl Future<Output = ()> + Send {
        let step = self.next_step();
        async move {
            match step {
                IdleStep::Spin => std::hint::spin_loop(),
                IdleStep::Yield => tokio::task::yield_now().await,
                IdleStep::Park(period) => tokio::time::sleep(period).await,
            }
        }
    }

    fn reset(&mut self) {
        self.phase = BackoffPhase::NotIdle;
        self.spins = 0;
        self.yields = 0;
        self.park_period = self.config.min_park;
    }

    fn alias(&self) -> &'static str { "backoff" }
}
