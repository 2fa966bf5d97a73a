pub mod config;
pub mod services;

pub use services::history::{Sample, SampleHistory};
pub use services::refresh::{
    AdaptiveConfig, AdaptiveRefreshStrategy, FixedIntervalStrategy, RefreshObservation,
    RefreshStrategy,
};
pub use services::scheduler::{
    BoxError, FetchError, PollService, PollSource, SchedulerConfig, ServiceError, ServiceEvent,
    ServiceHealthSnapshot, ServiceStatus,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the process-wide tracing subscriber. Call once at startup from
/// the host application; later calls are no-ops.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "glance_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
}
