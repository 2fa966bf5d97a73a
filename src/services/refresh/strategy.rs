use std::time::{Duration, Instant};

use crate::services::history::SampleHistory;

/// One poll cycle as seen by the adaptive strategy.
#[derive(Debug, Clone, Copy)]
pub struct RefreshObservation {
    pub timestamp: Instant,
    pub arrived: bool,
}

/// Decides when the next poll for a source should run.
///
/// The scheduler is strategy-agnostic: it reports what each poll found
/// (`record_success` for genuinely new data, `record_miss` for an error-free
/// poll with nothing new) and asks for the next delay. Fetch *failures* are
/// not routed here; the scheduler applies its own backoff table to those.
pub trait RefreshStrategy: Send + Sync {
    /// A poll discovered genuinely new data at `arrived_at`.
    fn record_success(&mut self, arrived_at: Instant);

    /// A poll completed without error but found no new data yet.
    fn record_miss(&mut self);

    /// Predicted wall-clock moment of the next check.
    fn next_check_time(&self, now: Instant) -> Instant;

    /// `max(0, next_check_time - now)`; zero means poll immediately.
    fn delay_until_next_check(&self, now: Instant) -> Duration;

    /// False once consecutive misses reach the strategy's threshold.
    /// Informational only; it never stops polling.
    fn should_retry(&self) -> bool {
        true
    }

    fn consecutive_misses(&self) -> u32 {
        0
    }
}

/// Constant-interval strategy for sources without a meaningful cadence.
///
/// Misses and successes do not change the interval; failure backoff is the
/// scheduler's job.
#[derive(Debug, Clone)]
pub struct FixedIntervalStrategy {
    interval: Duration,
}

impl FixedIntervalStrategy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl RefreshStrategy for FixedIntervalStrategy {
    fn record_success(&mut self, _arrived_at: Instant) {}

    fn record_miss(&mut self) {}

    fn next_check_time(&self, now: Instant) -> Instant {
        now + self.interval
    }

    fn delay_until_next_check(&self, _now: Instant) -> Duration {
        self.interval
    }
}

/// Tuning for [`AdaptiveRefreshStrategy`]. Immutable after construction.
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    /// Assumed publish interval before any history exists.
    pub base_interval: Duration,
    /// Hard lower clamp on the predicted delay.
    pub minimum_interval: Duration,
    /// Hard upper clamp on the predicted delay.
    pub maximum_interval: Duration,
    /// Safety margin added after the predicted arrival to tolerate jitter.
    pub initial_slack: Duration,
    /// Delay used while expected data has not arrived yet.
    pub retry_interval: Duration,
    /// Miss count at which `should_retry` turns false.
    pub max_retries: u32,
    /// Rolling window size for the cadence estimate.
    pub max_observations: usize,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(300),   // 5 minutes
            minimum_interval: Duration::from_secs(30), // 30 seconds
            maximum_interval: Duration::from_secs(900), // 15 minutes
            initial_slack: Duration::from_secs(30),    // 30 seconds
            retry_interval: Duration::from_secs(60),   // 1 minute
            max_retries: 5,
            max_observations: 20,
        }
    }
}

/// Predictive strategy for sources with a roughly periodic but jittery
/// publish cadence (a radar image every ~6 minutes, a forecast a few times a
/// day at no fixed minute).
///
/// Each confirmed arrival goes into a bounded observation window; the
/// estimated inter-arrival interval is the capped mean of the gaps between
/// consecutive arrivals, so a single abnormal gap never dominates. The next
/// check lands just after the predicted arrival plus slack. A miss means
/// "expected data has not arrived *yet*", so the delay collapses to
/// `retry_interval` instead of backing off — the inverse of failure backoff.
pub struct AdaptiveRefreshStrategy {
    config: AdaptiveConfig,
    observations: SampleHistory<RefreshObservation>,
    last_arrival: Option<Instant>,
    consecutive_misses: u32,
    estimated_interval: Duration,
}

impl AdaptiveRefreshStrategy {
    pub fn new(config: AdaptiveConfig) -> Self {
        let estimated_interval = clamp_interval(config.base_interval, &config);
        Self {
            observations: SampleHistory::new(config.max_observations),
            last_arrival: None,
            consecutive_misses: 0,
            estimated_interval,
            config,
        }
    }

    /// Current inter-arrival estimate, clamped to the configured bounds.
    pub fn estimated_interval(&self) -> Duration {
        self.estimated_interval
    }

    pub fn last_arrival(&self) -> Option<Instant> {
        self.last_arrival
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    fn recompute_estimate(&mut self) {
        let arrivals: Vec<Instant> = self
            .observations
            .to_vec()
            .into_iter()
            .filter(|o| o.arrived)
            .map(|o| o.timestamp)
            .collect();

        if arrivals.len() < 2 {
            return;
        }

        // Capped mean: clamp each gap before averaging so one outlier gap
        // cannot drag the estimate outside the configured bounds.
        let mut total = Duration::ZERO;
        let mut gaps = 0u32;
        for pair in arrivals.windows(2) {
            let gap = pair[1].saturating_duration_since(pair[0]);
            total += clamp_interval(gap, &self.config);
            gaps += 1;
        }
        self.estimated_interval = clamp_interval(total / gaps, &self.config);
    }
}

impl RefreshStrategy for AdaptiveRefreshStrategy {
    fn record_success(&mut self, arrived_at: Instant) {
        self.observations.add(RefreshObservation {
            timestamp: arrived_at,
            arrived: true,
        });
        self.last_arrival = Some(arrived_at);
        self.consecutive_misses = 0;
        self.recompute_estimate();
        tracing::debug!(
            estimated_secs = self.estimated_interval.as_secs(),
            observations = self.observations.len(),
            "recorded arrival"
        );
    }

    fn record_miss(&mut self) {
        self.observations.add(RefreshObservation {
            timestamp: Instant::now(),
            arrived: false,
        });
        self.consecutive_misses += 1;
        if self.consecutive_misses == self.config.max_retries {
            tracing::warn!(
                misses = self.consecutive_misses,
                "expected data still missing after repeated checks"
            );
        }
    }

    fn next_check_time(&self, now: Instant) -> Instant {
        match self.last_arrival {
            Some(arrival) => arrival + self.estimated_interval + self.config.initial_slack,
            None => now + self.config.base_interval,
        }
    }

    fn delay_until_next_check(&self, now: Instant) -> Duration {
        // While data is overdue, poll again soon rather than backing off;
        // the source is expected to publish any moment now.
        if self.consecutive_misses > 0 {
            return self.config.retry_interval;
        }
        self.next_check_time(now).saturating_duration_since(now)
    }

    fn should_retry(&self) -> bool {
        self.consecutive_misses < self.config.max_retries
    }

    fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }
}

fn clamp_interval(value: Duration, config: &AdaptiveConfig) -> Duration {
    value.clamp(config.minimum_interval, config.maximum_interval)
}
