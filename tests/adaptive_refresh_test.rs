use std::time::{Duration, Instant};

use glance_core::{AdaptiveConfig, AdaptiveRefreshStrategy, RefreshStrategy};

fn radar_config() -> AdaptiveConfig {
    AdaptiveConfig {
        base_interval: Duration::from_secs(360),    // 6 minutes
        minimum_interval: Duration::from_secs(30),  // 30 seconds
        maximum_interval: Duration::from_secs(900), // 15 minutes
        initial_slack: Duration::from_secs(30),     // 30 seconds
        retry_interval: Duration::from_secs(60),    // 1 minute
        max_retries: 5,
        max_observations: 20,
    }
}

#[test]
fn test_estimate_converges_on_observed_cadence() {
    // Radar publishes every 6m10s; five arrivals should pin the estimate
    let mut strategy = AdaptiveRefreshStrategy::new(radar_config());
    let start = Instant::now();
    let cadence = Duration::from_secs(370);

    let mut last_arrival = start;
    for i in 0..5 {
        last_arrival = start + cadence * i;
        strategy.record_success(last_arrival);
    }

    let estimate = strategy.estimated_interval();
    let tolerance = Duration::from_secs(5);
    assert!(
        estimate >= cadence - tolerance && estimate <= cadence + tolerance,
        "estimate {estimate:?} not within 5s of {cadence:?}"
    );

    // Immediately after the 5th arrival: interval + slack, about 6m40s
    let delay = strategy.delay_until_next_check(last_arrival);
    let expected = Duration::from_secs(370 + 30);
    assert!(
        delay >= expected - tolerance && delay <= expected + tolerance,
        "delay {delay:?} not within 5s of {expected:?}"
    );
}

#[test]
fn test_miss_delay_never_grows() {
    // The inverse of failure backoff: while data is overdue, the delay must
    // trend toward retry_interval, never upward.
    let config = radar_config();
    let max_retries = config.max_retries;
    let mut strategy = AdaptiveRefreshStrategy::new(config);
    let now = Instant::now();

    strategy.record_success(now);

    strategy.record_miss();
    let after_first_miss = strategy.delay_until_next_check(now);

    for k in 2..max_retries {
        strategy.record_miss();
        let delay = strategy.delay_until_next_check(now);
        assert!(
            delay <= after_first_miss,
            "delay after miss {k} ({delay:?}) exceeds delay after first miss ({after_first_miss:?})"
        );
    }

    assert_eq!(after_first_miss, Duration::from_secs(60));
}

#[test]
fn test_success_resets_misses_and_bounds_estimate() {
    let config = radar_config();
    let min = config.minimum_interval;
    let max = config.maximum_interval;
    let mut strategy = AdaptiveRefreshStrategy::new(config);
    let start = Instant::now();

    strategy.record_success(start);
    for _ in 0..4 {
        strategy.record_miss();
    }
    assert_eq!(strategy.consecutive_misses(), 4);

    strategy.record_success(start + Duration::from_secs(500));

    assert_eq!(strategy.consecutive_misses(), 0);
    let estimate = strategy.estimated_interval();
    assert!(estimate >= min && estimate <= max);
}

#[test]
fn test_estimate_bounded_under_extreme_gaps() {
    let config = radar_config();
    let min = config.minimum_interval;
    let max = config.maximum_interval;
    let mut strategy = AdaptiveRefreshStrategy::new(config);
    let start = Instant::now();

    // Pathological feed: instant bursts followed by hour-long silences
    let offsets = [0u64, 1, 2, 3700, 3701, 11_000];
    for secs in offsets {
        strategy.record_success(start + Duration::from_secs(secs));
    }

    let estimate = strategy.estimated_interval();
    assert!(estimate >= min && estimate <= max);
}

#[test]
fn test_prediction_anchors_on_last_arrival() {
    let mut strategy = AdaptiveRefreshStrategy::new(radar_config());
    let start = Instant::now();
    let cadence = Duration::from_secs(370);

    for i in 0..3 {
        strategy.record_success(start + cadence * i);
    }
    let last = start + cadence * 2;

    let next = strategy.next_check_time(last);
    assert_eq!(next, last + strategy.estimated_interval() + Duration::from_secs(30));

    // Asking halfway through the window reduces the remaining delay
    let halfway = last + Duration::from_secs(200);
    assert_eq!(
        strategy.delay_until_next_check(halfway),
        next.saturating_duration_since(halfway)
    );
}
