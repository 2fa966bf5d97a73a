use std::env;
use std::time::Duration;

use crate::services::refresh::AdaptiveConfig;
use crate::services::scheduler::SchedulerConfig;

/// Environment configuration for poll tuning.
/// Every variable has a default; running without a `.env` file works.
pub struct Config {
    pub refresh_interval_secs: u64,
    pub max_retries: u32,
    pub max_observations: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            refresh_interval_secs: env_or("GLANCE_REFRESH_INTERVAL_SECS", 300),
            max_retries: env_or("GLANCE_MAX_RETRIES", 5),
            max_observations: env_or("GLANCE_MAX_OBSERVATIONS", 20),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            max_retries: self.max_retries,
        }
    }

    pub fn adaptive_config(&self) -> AdaptiveConfig {
        AdaptiveConfig {
            max_observations: self.max_observations,
            ..AdaptiveConfig::default()
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
