use std::time::Duration;

/// Escalating delays applied after consecutive fetch failures, indexed by the
/// failure count (1-based) and capped at the final entry.
const FAILURE_BACKOFF: [Duration; 6] = [
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(120),
    Duration::from_secs(300),
    Duration::from_secs(600),
    Duration::from_secs(1800),
];

/// Delay before the next attempt after `consecutive_failures` failures.
pub fn delay_for_failure(consecutive_failures: u32) -> Duration {
    let index = (consecutive_failures.saturating_sub(1) as usize).min(FAILURE_BACKOFF.len() - 1);
    FAILURE_BACKOFF[index]
}
