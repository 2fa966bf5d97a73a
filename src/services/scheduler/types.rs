use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Errors produced by source hooks. Boxed so every source can carry its own
/// error type through the narrow trait seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Lifecycle state of a polling service. Transitions are owned exclusively
/// by the service; external readers see eventually consistent snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    Degraded,
    Faulted,
    Stopping,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Faulted => "faulted",
            Self::Stopping => "stopping",
        }
    }
}

/// Scheduler tuning. Constructor-time, immutable thereafter.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Poll interval used by the fixed-interval path.
    pub refresh_interval: Duration,
    /// Consecutive fetch failures tolerated before the service faults.
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(300), // 5 minutes
            max_retries: 5,
        }
    }
}

/// Everything the service emits toward the consumer context.
///
/// All variants for one service instance flow through a single channel bound
/// at construction, so the consumer observes them on one context no matter
/// which worker thread ran the fetch.
#[derive(Debug)]
pub enum ServiceEvent<T> {
    /// New data was fetched and persisted.
    DataReceived {
        service: String,
        data: T,
        is_new_data: bool,
        timestamp: DateTime<Utc>,
    },
    StatusChanged {
        service: String,
        old_status: ServiceStatus,
        new_status: ServiceStatus,
    },
    /// A fetch or store hook failed. `will_retry` is false only for the
    /// terminal failure that faults the service.
    ErrorOccurred {
        service: String,
        message: String,
        will_retry: bool,
        next_retry_time: Option<DateTime<Utc>>,
    },
}

/// Serializable projection of the service state for UI/status surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealthSnapshot {
    pub service: String,
    pub status: ServiceStatus,
    pub consecutive_failures: u32,
    pub last_refresh: Option<DateTime<Utc>>,
    pub next_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The initialization hook failed. Fatal: the service faults and the
    /// error surfaces to the `start()` caller instead of being retried.
    #[error("initialization failed: {0}")]
    Initialization(#[source] BoxError),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The fetch observed cancellation. Neither success nor failure: no
    /// counters change and no event is raised.
    #[error("fetch cancelled")]
    Cancelled,
    #[error(transparent)]
    Source(#[from] BoxError),
}

/// The seam between the engine and a concrete information source (weather
/// feed, astronomy API, market data, RSS). Implemented elsewhere; the engine
/// only calls through this trait.
#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    type Data: Send + 'static;

    /// Stable name used in logs and events.
    fn name(&self) -> &str;

    /// Synchronous warm-up (e.g. priming a local cache). An error here is
    /// fatal to `start()`.
    fn initialize(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Fetch from the source. `Ok(None)` means "no new data yet" (a miss,
    /// not an error). Implementations own their timeouts; the engine never
    /// imposes one. Observe `cancel` and return [`FetchError::Cancelled`]
    /// when shutting down mid-flight.
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Option<Self::Data>, FetchError>;

    /// Persist confirmed new data. Runs before the `DataReceived` event for
    /// the same result; an error counts as a cycle failure.
    async fn store(&self, _data: &Self::Data) -> Result<(), BoxError> {
        Ok(())
    }

    /// Synchronous teardown. Errors are logged and swallowed so shutdown
    /// always completes.
    fn shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Blanket implementation so an `Arc`-shared source can be handed to the
/// engine directly.
#[async_trait]
impl<T: PollSource + ?Sized> PollSource for std::sync::Arc<T>
where
    T::Data: Sync,
{
    type Data = T::Data;

    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&self) -> Result<(), BoxError> {
        (**self).initialize()
    }

    async fn fetch(&self, cancel: &CancellationToken) -> Result<Option<Self::Data>, FetchError> {
        (**self).fetch(cancel).await
    }

    async fn store(&self, data: &Self::Data) -> Result<(), BoxError> {
        (**self).store(data).await
    }

    fn shutdown(&self) -> Result<(), BoxError> {
        (**self).shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_as_str() {
        assert_eq!(ServiceStatus::Running.as_str(), "running");
        assert_eq!(ServiceStatus::Faulted.as_str(), "faulted");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ServiceStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = ServiceHealthSnapshot {
            service: "radar".to_string(),
            status: ServiceStatus::Running,
            consecutive_failures: 0,
            last_refresh: Some(Utc::now()),
            next_refresh: None,
            last_error: None,
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["service"], "radar");
        assert_eq!(json["status"], "running");
    }
}
