use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::services::refresh::{AdaptiveConfig, AdaptiveRefreshStrategy, FixedIntervalStrategy, RefreshStrategy};
use crate::services::scheduler::backoff;
use crate::services::scheduler::types::{
    FetchError, PollSource, SchedulerConfig, ServiceError, ServiceEvent, ServiceHealthSnapshot,
    ServiceStatus,
};

/// Timer-driven polling service for one information source.
///
/// Owns the full lifecycle state machine (§`ServiceStatus`), a refresh
/// strategy deciding when to poll next, the failure counters, and the event
/// channel toward the consumer. One instance per source; instances share
/// nothing.
pub struct PollService<S: PollSource> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: PollSource> {
    source: S,
    config: SchedulerConfig,
    state: RwLock<EngineState>,
    events: UnboundedSender<ServiceEvent<S::Data>>,
    refresh: Notify,
    in_flight: AtomicBool,
}

struct EngineState {
    status: ServiceStatus,
    consecutive_failures: u32,
    last_refresh: Option<DateTime<Utc>>,
    next_refresh: Option<DateTime<Utc>>,
    last_error: Option<String>,
    strategy: Box<dyn RefreshStrategy>,
    /// Set by a failure cycle; consumed once when the next delay is computed.
    pending_backoff: Option<Duration>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

enum CycleOutcome<T> {
    NewData(T),
    Miss,
    Failure(String),
    Cancelled,
}

impl<S: PollSource> PollService<S> {
    /// Create a service with an explicit refresh strategy. Returns the
    /// receiver the consumer binds once; every event for this instance is
    /// delivered through it.
    pub fn new(
        source: S,
        config: SchedulerConfig,
        strategy: Box<dyn RefreshStrategy>,
    ) -> (Self, UnboundedReceiver<ServiceEvent<S::Data>>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            source,
            config,
            state: RwLock::new(EngineState {
                status: ServiceStatus::Stopped,
                consecutive_failures: 0,
                last_refresh: None,
                next_refresh: None,
                last_error: None,
                strategy,
                pending_backoff: None,
                cancel: None,
                task: None,
            }),
            events,
            refresh: Notify::new(),
            in_flight: AtomicBool::new(false),
        });
        (Self { inner }, receiver)
    }

    /// Fixed-interval polling at `config.refresh_interval`.
    pub fn with_fixed_interval(
        source: S,
        config: SchedulerConfig,
    ) -> (Self, UnboundedReceiver<ServiceEvent<S::Data>>) {
        let strategy = Box::new(FixedIntervalStrategy::new(config.refresh_interval));
        Self::new(source, config, strategy)
    }

    /// Cadence-predicting polling for sources with an irregular-but-bursty
    /// publish schedule.
    pub fn with_adaptive(
        source: S,
        config: SchedulerConfig,
        adaptive: AdaptiveConfig,
    ) -> (Self, UnboundedReceiver<ServiceEvent<S::Data>>) {
        let strategy = Box::new(AdaptiveRefreshStrategy::new(adaptive));
        Self::new(source, config, strategy)
    }

    pub fn name(&self) -> &str {
        self.inner.source.name()
    }

    /// Run the initialization hook and start the polling loop. The first
    /// tick fires immediately.
    ///
    /// A no-op unless the service is `Stopped` or `Faulted`; restarting a
    /// faulted service is the supported recovery path and resets its failure
    /// counter. An initialization error faults the service and propagates to
    /// the caller.
    pub async fn start(&self) -> Result<(), ServiceError> {
        let mut state = self.inner.state.write().await;
        if !matches!(state.status, ServiceStatus::Stopped | ServiceStatus::Faulted) {
            tracing::warn!(
                service = %self.inner.source.name(),
                status = state.status.as_str(),
                "start ignored; service is neither stopped nor faulted"
            );
            return Ok(());
        }

        self.inner.set_status(&mut state, ServiceStatus::Starting);

        if let Err(e) = self.inner.source.initialize() {
            state.last_error = Some(e.to_string());
            self.inner.set_status(&mut state, ServiceStatus::Faulted);
            tracing::error!(
                service = %self.inner.source.name(),
                error = %e,
                "initialization failed"
            );
            return Err(ServiceError::Initialization(e));
        }

        state.consecutive_failures = 0;
        state.last_error = None;
        state.pending_backoff = None;

        let cancel = CancellationToken::new();
        state.cancel = Some(cancel.clone());
        let inner = Arc::clone(&self.inner);
        state.task = Some(tokio::spawn(async move {
            inner.run(cancel).await;
        }));

        self.inner.set_status(&mut state, ServiceStatus::Running);
        tracing::info!(service = %self.inner.source.name(), "service started");
        Ok(())
    }

    /// Re-arm the timer to fire at the next possible moment.
    ///
    /// Never cancels or affects an in-flight fetch: while a fetch is running
    /// the trigger only shortens the delay *after* that fetch completes.
    pub fn refresh_now(&self) {
        tracing::debug!(service = %self.inner.source.name(), "manual refresh requested");
        self.inner.refresh.notify_one();
    }

    /// Cancel the polling loop, join it, run the shutdown hook, and
    /// transition to `Stopped`. Idempotent; always completes even if the
    /// shutdown hook fails.
    pub async fn stop(&self) {
        let (cancel, task) = {
            let mut state = self.inner.state.write().await;
            if state.status == ServiceStatus::Stopped {
                tracing::debug!(service = %self.inner.source.name(), "stop ignored; already stopped");
                return;
            }
            self.inner.set_status(&mut state, ServiceStatus::Stopping);
            (state.cancel.take(), state.task.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(
                    service = %self.inner.source.name(),
                    error = %e,
                    "poll loop terminated abnormally"
                );
            }
        }

        if let Err(e) = self.inner.source.shutdown() {
            tracing::warn!(
                service = %self.inner.source.name(),
                error = %e,
                "shutdown hook failed"
            );
        }

        let mut state = self.inner.state.write().await;
        state.next_refresh = None;
        self.inner.set_status(&mut state, ServiceStatus::Stopped);
        tracing::info!(service = %self.inner.source.name(), "service stopped");
    }

    pub async fn status(&self) -> ServiceStatus {
        self.inner.state.read().await.status
    }

    pub async fn consecutive_failures(&self) -> u32 {
        self.inner.state.read().await.consecutive_failures
    }

    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().await.last_refresh
    }

    pub async fn next_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().await.next_refresh
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.state.read().await.last_error.clone()
    }

    /// Point-in-time projection of the service state for UI surfaces.
    pub async fn health_snapshot(&self) -> ServiceHealthSnapshot {
        let state = self.inner.state.read().await;
        ServiceHealthSnapshot {
            service: self.inner.source.name().to_string(),
            status: state.status,
            consecutive_failures: state.consecutive_failures,
            last_refresh: state.last_refresh,
            next_refresh: state.next_refresh,
            last_error: state.last_error.clone(),
        }
    }
}

impl<S: PollSource> Inner<S> {
    /// The polling loop: compute the next delay, wait for the timer, a
    /// manual refresh, or cancellation, then run one fetch cycle.
    ///
    /// Cycles for one instance are strictly serialized. There is no
    /// operation-level fetch timeout: a fetch that ignores the cancellation
    /// token blocks this instance's next tick indefinitely, by design — the
    /// fetch implementation owns timeouts.
    async fn run(&self, cancel: CancellationToken) {
        let mut first_tick = true;
        loop {
            let delay = {
                let mut state = self.state.write().await;
                if !matches!(state.status, ServiceStatus::Running | ServiceStatus::Degraded) {
                    break;
                }
                let delay = if first_tick {
                    first_tick = false;
                    Duration::ZERO
                } else if let Some(backoff) = state.pending_backoff.take() {
                    backoff
                } else {
                    state.strategy.delay_until_next_check(monotonic_now())
                };
                state.next_refresh = Some(wall_clock_after(delay));
                delay
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                _ = self.refresh.notified() => {
                    tracing::debug!(service = %self.source.name(), "timer re-armed by manual refresh");
                }
            }
            if cancel.is_cancelled() {
                break;
            }

            if self.run_cycle(&cancel).await {
                break;
            }
        }
        tracing::debug!(service = %self.source.name(), "poll loop exited");
    }

    /// One fetch cycle. Returns true when the service faulted.
    async fn run_cycle(&self, cancel: &CancellationToken) -> bool {
        // Ticks arriving while a fetch is in flight are dropped, not queued.
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!(service = %self.source.name(), "tick dropped; fetch still in flight");
            return false;
        }

        let outcome = match self.source.fetch(cancel).await {
            Ok(Some(data)) => match self.source.store(&data).await {
                // Persist happens-before the DataReceived event.
                Ok(()) => CycleOutcome::NewData(data),
                Err(e) => CycleOutcome::Failure(format!("store failed: {e}")),
            },
            Ok(None) => CycleOutcome::Miss,
            Err(FetchError::Cancelled) => CycleOutcome::Cancelled,
            Err(_) if cancel.is_cancelled() => CycleOutcome::Cancelled,
            Err(e) => CycleOutcome::Failure(e.to_string()),
        };

        let faulted = self.apply_outcome(outcome).await;
        self.in_flight.store(false, Ordering::SeqCst);
        faulted
    }

    async fn apply_outcome(&self, outcome: CycleOutcome<S::Data>) -> bool {
        let mut state = self.state.write().await;
        match outcome {
            CycleOutcome::NewData(data) => {
                let now = Utc::now();
                state.last_refresh = Some(now);
                state.consecutive_failures = 0;
                state.last_error = None;
                state.strategy.record_success(monotonic_now());
                if state.status == ServiceStatus::Degraded {
                    self.set_status(&mut state, ServiceStatus::Running);
                }
                self.emit(ServiceEvent::DataReceived {
                    service: self.source.name().to_string(),
                    data,
                    is_new_data: true,
                    timestamp: now,
                });
                false
            }
            CycleOutcome::Miss => {
                // Not an error: no event, failure counter untouched.
                state.last_refresh = Some(Utc::now());
                state.strategy.record_miss();
                if !state.strategy.should_retry() {
                    tracing::warn!(
                        service = %self.source.name(),
                        misses = state.strategy.consecutive_misses(),
                        "source overdue beyond its miss threshold"
                    );
                }
                false
            }
            CycleOutcome::Cancelled => {
                tracing::debug!(service = %self.source.name(), "fetch cancelled; cycle discarded");
                false
            }
            CycleOutcome::Failure(message) => {
                state.consecutive_failures += 1;
                state.last_error = Some(message.clone());

                if state.consecutive_failures >= self.config.max_retries {
                    tracing::error!(
                        service = %self.source.name(),
                        failures = state.consecutive_failures,
                        error = %message,
                        "retries exhausted; service faulted"
                    );
                    state.next_refresh = None;
                    self.set_status(&mut state, ServiceStatus::Faulted);
                    self.emit(ServiceEvent::ErrorOccurred {
                        service: self.source.name().to_string(),
                        message,
                        will_retry: false,
                        next_retry_time: None,
                    });
                    true
                } else {
                    let delay = backoff::delay_for_failure(state.consecutive_failures);
                    let next_retry = wall_clock_after(delay);
                    state.pending_backoff = Some(delay);
                    state.next_refresh = Some(next_retry);
                    if state.status == ServiceStatus::Running {
                        self.set_status(&mut state, ServiceStatus::Degraded);
                    }
                    tracing::warn!(
                        service = %self.source.name(),
                        failures = state.consecutive_failures,
                        retry_in_secs = delay.as_secs(),
                        error = %message,
                        "fetch failed; retry scheduled"
                    );
                    self.emit(ServiceEvent::ErrorOccurred {
                        service: self.source.name().to_string(),
                        message,
                        will_retry: true,
                        next_retry_time: Some(next_retry),
                    });
                    false
                }
            }
        }
    }

    fn set_status(&self, state: &mut EngineState, new_status: ServiceStatus) {
        if state.status == new_status {
            return;
        }
        let old_status = state.status;
        state.status = new_status;
        tracing::info!(
            service = %self.source.name(),
            from = old_status.as_str(),
            to = new_status.as_str(),
            "status changed"
        );
        self.emit(ServiceEvent::StatusChanged {
            service: self.source.name().to_string(),
            old_status,
            new_status,
        });
    }

    fn emit(&self, event: ServiceEvent<S::Data>) {
        if self.events.send(event).is_err() {
            tracing::debug!(service = %self.source.name(), "event receiver dropped");
        }
    }
}

fn wall_clock_after(delay: Duration) -> DateTime<Utc> {
    Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}

/// The engine's monotonic clock. Going through tokio keeps strategy inputs
/// consistent with the timers the loop actually sleeps on.
fn monotonic_now() -> Instant {
    tokio::time::Instant::now().into_std()
}
