//! Poll-based readiness gating for broker containers.
//!
//! A fixed startup sleep is flaky under variable startup latency (cold image
//! pulls, disk contention), so container start blocks on an observed readiness
//! signal instead: a [`WaitStrategy`] polls a [`LogSource`] until the broker
//! announces itself or the wait budget runs out.

use crate::runtime::{Result, RuntimeError};
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::LogsOptionsBuilder;
use futures::stream::StreamExt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default interval between readiness polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default total wait budget before a start attempt is declared failed.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

/// Parameters for a readiness wait.
///
/// Constructed once per container request and discarded after the container
/// is declared ready or the wait fails.
#[derive(Debug, Clone)]
pub struct WaitCondition {
    marker: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl WaitCondition {
    /// Create a wait condition, enforcing `max_wait >= poll_interval > 0`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] if the bounds are violated.
    pub fn new(
        marker: impl Into<String>,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<Self> {
        if poll_interval.is_zero() {
            return Err(RuntimeError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if max_wait < poll_interval {
            return Err(RuntimeError::Config(format!(
                "max wait {max_wait:?} is shorter than poll interval {poll_interval:?}"
            )));
        }
        Ok(Self {
            marker: marker.into(),
            poll_interval,
            max_wait,
        })
    }

    /// Create a wait condition for a marker with the default poll cadence.
    pub fn for_marker(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// The log marker that signals readiness.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Interval between polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Total wait budget.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

/// A source of observable output from the target process.
///
/// Each call returns the output visible so far; the wait loop inspects the
/// latest snapshot on every poll.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch the currently observable output.
    async fn observe(&self) -> Result<String>;
}

/// Outcome of a single readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// The readiness signal was observed
    Ready,
    /// No readiness signal yet
    NotYet,
}

/// A poll-based readiness strategy.
///
/// Implementations decide what a single poll inspects; the provided
/// [`wait_ready`](WaitStrategy::wait_ready) loop drives polling at the
/// condition's cadence and blocks the calling task until a terminal result.
/// The wait is one-shot per container lifecycle and is not restartable after
/// it returns.
///
/// Additional variants (HTTP health check, port-open probe) can implement
/// [`poll`](WaitStrategy::poll) without changing the container-start
/// contract.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// The condition driving the polling loop.
    fn condition(&self) -> &WaitCondition;

    /// Inspect the source once.
    ///
    /// # Errors
    ///
    /// Returns error if the source cannot be observed.
    async fn poll(&self, source: &dyn LogSource) -> Result<ReadyState>;

    /// Poll until ready or until the wait budget elapses.
    ///
    /// Returns [`RuntimeError::ReadyTimeout`] no later than `max_wait` plus
    /// one poll interval of slack.
    ///
    /// # Errors
    ///
    /// Returns error on timeout or if a poll fails.
    async fn wait_ready(&self, source: &dyn LogSource) -> Result<()> {
        let condition = self.condition();
        let started = Instant::now();

        loop {
            if self.poll(source).await? == ReadyState::Ready {
                debug!(
                    "Readiness marker observed after {:?}",
                    started.elapsed()
                );
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= condition.max_wait() {
                return Err(RuntimeError::ReadyTimeout {
                    marker: condition.marker().to_string(),
                    waited,
                });
            }

            tokio::time::sleep(condition.poll_interval()).await;
        }
    }
}

/// Readiness strategy that scans observed output for a marker substring.
pub struct LogMarkerStrategy {
    condition: WaitCondition,
}

impl LogMarkerStrategy {
    /// Create a marker-scanning strategy from a wait condition.
    pub fn new(condition: WaitCondition) -> Self {
        Self { condition }
    }
}

#[async_trait]
impl WaitStrategy for LogMarkerStrategy {
    fn condition(&self) -> &WaitCondition {
        &self.condition
    }

    async fn poll(&self, source: &dyn LogSource) -> Result<ReadyState> {
        let output = source.observe().await?;
        if output.contains(self.condition.marker()) {
            Ok(ReadyState::Ready)
        } else {
            debug!(
                "Marker {:?} not observed yet ({} bytes of output)",
                self.condition.marker(),
                output.len()
            );
            Ok(ReadyState::NotYet)
        }
    }
}

/// [`LogSource`] over a container's stdout and stderr.
pub struct ContainerLogs {
    docker: Docker,
    container_id: String,
}

impl ContainerLogs {
    /// Create a log source for a container.
    pub fn new(docker: Docker, container_id: impl Into<String>) -> Self {
        Self {
            docker,
            container_id: container_id.into(),
        }
    }
}

#[async_trait]
impl LogSource for ContainerLogs {
    async fn observe(&self) -> Result<String> {
        let mut stream = self.docker.logs(
            &self.container_id,
            Some(
                LogsOptionsBuilder::default()
                    .stdout(true)
                    .stderr(true)
                    .tail("all")
                    .build(),
            ),
        );

        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?.to_string());
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Log source that replays a scripted sequence of snapshots, then keeps
    /// returning the last one.
    struct ScriptedLogs {
        snapshots: Mutex<VecDeque<String>>,
        last: Mutex<String>,
    }

    impl ScriptedLogs {
        fn new(snapshots: Vec<&str>) -> Self {
            Self {
                snapshots: Mutex::new(snapshots.into_iter().map(String::from).collect()),
                last: Mutex::new(String::new()),
            }
        }
    }

    #[async_trait]
    impl LogSource for ScriptedLogs {
        async fn observe(&self) -> Result<String> {
            if let Some(next) = self.snapshots.lock().unwrap().pop_front() {
                *self.last.lock().unwrap() = next.clone();
                return Ok(next);
            }
            Ok(self.last.lock().unwrap().clone())
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn condition_rejects_zero_interval() {
        let result = WaitCondition::new("ready", Duration::ZERO, ms(100));
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn condition_rejects_budget_shorter_than_interval() {
        let result = WaitCondition::new("ready", ms(100), ms(50));
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn condition_accepts_equal_bounds() {
        let condition = WaitCondition::new("ready", ms(100), ms(100)).unwrap();
        assert_eq!(condition.poll_interval(), condition.max_wait());
    }

    #[tokio::test]
    async fn marker_in_first_snapshot_is_ready() {
        let strategy = LogMarkerStrategy::new(WaitCondition::for_marker("Broker is ready"));
        let source = ScriptedLogs::new(vec!["startup...\nBroker is ready\n"]);
        assert_eq!(strategy.poll(&source).await.unwrap(), ReadyState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_across_polls_until_marker_appears() {
        let condition = WaitCondition::new("accepting requests", ms(50), ms(1000)).unwrap();
        let strategy = LogMarkerStrategy::new(condition);
        let source = ScriptedLogs::new(vec![
            "booting\n",
            "booting\nloading partitions\n",
            "booting\nloading partitions\naccepting requests\n",
        ]);

        let started = Instant::now();
        strategy.wait_ready(&source).await.unwrap();

        // Two sleeps before the third poll observes the marker.
        assert!(started.elapsed() >= ms(100));
        assert!(started.elapsed() < ms(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_one_interval_of_slack() {
        let condition = WaitCondition::new("never-logged", ms(50), ms(200)).unwrap();
        let strategy = LogMarkerStrategy::new(condition);
        let source = ScriptedLogs::new(vec!["still starting\n"]);

        let started = Instant::now();
        let err = strategy.wait_ready(&source).await.unwrap_err();

        match err {
            RuntimeError::ReadyTimeout { marker, waited } => {
                assert_eq!(marker, "never-logged");
                assert!(waited >= ms(200));
            }
            other => panic!("expected ReadyTimeout, got {other:?}"),
        }
        assert!(started.elapsed() <= ms(250));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_marker_from_condition() {
        let condition = WaitCondition::new("gateway up", ms(10), ms(30)).unwrap();
        let strategy = LogMarkerStrategy::new(condition);
        let source = ScriptedLogs::new(vec![]);

        let err = strategy.wait_ready(&source).await.unwrap_err();
        assert!(err.to_string().contains("gateway up"));
    }
}
