//! Wait-for-state engine
//!
//! Polls an observation function until the observed status reaches the
//! target set, leaves the pending set, or the timeout budget runs out.

use crate::clock::Clock;
use crate::error::{CloudError, Result};
use crate::status::{ResourceStatus, StatusClass, Transition};
use std::future::Future;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(10);

/// One observation of a resource or job
#[derive(Debug, Clone)]
pub struct Observation<T, S> {
    /// Observed object, absent once it no longer exists
    pub object: Option<T>,
    pub status: S,
}

impl<T, S> Observation<T, S> {
    pub fn new(object: T, status: S) -> Self {
        Self {
            object: Some(object),
            status,
        }
    }

    pub fn gone(status: S) -> Self {
        Self {
            object: None,
            status,
        }
    }
}

/// Per-call wait parameters
#[derive(Debug, Clone)]
pub struct WaitConfig<S> {
    pub transition: Transition<S>,
    /// Total budget including the initial delay
    pub timeout: Duration,
    /// Sleep before the first observation
    pub delay: Duration,
    /// Floor for the interval between observations
    pub min_interval: Duration,
    /// Cap for the doubling interval
    pub max_interval: Duration,
}

impl<S: ResourceStatus> WaitConfig<S> {
    pub fn new(transition: Transition<S>) -> Self {
        Self {
            transition,
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
            min_interval: DEFAULT_MIN_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        if self.max_interval < min_interval {
            self.max_interval = min_interval;
        }
        self
    }

    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval.max(self.min_interval);
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current
            .saturating_mul(2)
            .min(self.max_interval)
            .max(self.min_interval)
    }
}

/// Poll `observe` until the status reaches the configured target.
///
/// Returns the last observed object (`None` when the target was reached
/// because the object disappeared). A not-found error from `observe` counts
/// as the deleted status only when the transition targets deletion; any
/// other error is returned as is.
pub async fn wait_for_state<T, S, F, Fut>(
    clock: &dyn Clock,
    config: &WaitConfig<S>,
    mut observe: F,
) -> Result<Option<T>>
where
    S: ResourceStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Observation<T, S>>>,
{
    let start = clock.now();
    let deleting = config.transition.expects_deletion();

    if !config.delay.is_zero() {
        tracing::debug!("Waiting {:?} before first status check", config.delay);
        clock.sleep(config.delay).await;
    }

    let mut interval = config.min_interval;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        let observation = match observe().await {
            Ok(observation) => observation,
            Err(e) if deleting && e.is_not_found() => {
                tracing::debug!("Object not found, treating as {}", S::deleted());
                Observation::gone(S::deleted())
            }
            Err(e) => return Err(e),
        };

        match config.transition.classify(&observation.status) {
            StatusClass::Target => {
                tracing::debug!(
                    "Reached state '{}' after {} check(s)",
                    observation.status,
                    polls
                );
                return Ok(observation.object);
            }
            StatusClass::Failure => {
                return Err(CloudError::UnexpectedState {
                    status: observation.status.to_string(),
                    target: config.transition.target_display(),
                });
            }
            StatusClass::Pending => {}
        }

        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= config.timeout {
            return Err(CloudError::Timeout {
                last_status: observation.status.to_string(),
                target: config.transition.target_display(),
                timeout: config.timeout,
            });
        }

        let pause = interval.min(config.timeout - elapsed);
        tracing::debug!(
            "State '{}' still pending, next check in {:?}",
            observation.status,
            pause
        );
        clock.sleep(pause).await;
        interval = config.next_interval(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::status::tests::TestStatus;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a fixed list of observations, repeating the last one
    struct Script {
        steps: Mutex<VecDeque<Result<Observation<&'static str, TestStatus>>>>,
        calls: Mutex<usize>,
    }

    impl Script {
        fn new(steps: Vec<Result<Observation<&'static str, TestStatus>>>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(0),
            }
        }

        fn statuses(statuses: &[TestStatus]) -> Self {
            Self::new(
                statuses
                    .iter()
                    .map(|s| Ok(Observation::new("share", s.clone())))
                    .collect(),
            )
        }

        async fn observe(&self) -> Result<Observation<&'static str, TestStatus>> {
            *self.calls.lock().unwrap() += 1;
            let mut steps = self.steps.lock().unwrap();
            if steps.len() > 1 {
                steps.pop_front().unwrap()
            } else {
                match steps.front().unwrap() {
                    Ok(o) => Ok(o.clone()),
                    Err(_) => Err(CloudError::NotFound("share".into())),
                }
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    fn building_to_active() -> WaitConfig<TestStatus> {
        WaitConfig::new(Transition::new([TestStatus::Building], [TestStatus::Active]))
            .timeout(Duration::from_secs(60))
            .delay(Duration::from_secs(10))
            .min_interval(Duration::from_secs(3))
    }

    #[tokio::test]
    async fn test_reaches_target() {
        let clock = ManualClock::new();
        let script = Script::statuses(&[
            TestStatus::Building,
            TestStatus::Building,
            TestStatus::Active,
        ]);

        let result = wait_for_state(&clock, &building_to_active(), || script.observe()).await;

        assert_eq!(result.unwrap(), Some("share"));
        assert_eq!(script.calls(), 3);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(3),
                Duration::from_secs(6)
            ]
        );
    }

    #[tokio::test]
    async fn test_target_on_first_check() {
        let clock = ManualClock::new();
        let script = Script::statuses(&[TestStatus::Active]);
        let config = building_to_active().delay(Duration::ZERO);

        let result = wait_for_state(&clock, &config, || script.observe()).await;

        assert!(result.is_ok());
        assert_eq!(script.calls(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_pending_past_timeout() {
        let clock = ManualClock::new();
        let script = Script::statuses(&[TestStatus::Building]);

        let err = wait_for_state(&clock, &building_to_active(), || script.observe())
            .await
            .unwrap_err();

        match err {
            CloudError::Timeout {
                last_status,
                timeout,
                ..
            } => {
                assert_eq!(last_status, "BUILDING");
                assert_eq!(timeout, Duration::from_secs(60));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        // Never sleeps past the budget
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_unexpected_state_stops_immediately() {
        let clock = ManualClock::new();
        let script = Script::statuses(&[
            TestStatus::Building,
            TestStatus::Error,
            TestStatus::Active,
        ]);

        let err = wait_for_state(&clock, &building_to_active(), || script.observe())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CloudError::UnexpectedState { ref status, .. } if status == "ERROR"
        ));
        assert_eq!(script.calls(), 2);
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_not_found_while_deleting_is_success() {
        let clock = ManualClock::new();
        let script = Script::new(vec![
            Ok(Observation::new("share", TestStatus::Active)),
            Err(CloudError::api(404, "no such share")),
        ]);
        let config = WaitConfig::new(Transition::to_deleted([TestStatus::Active]))
            .min_interval(Duration::from_secs(3));

        let result = wait_for_state(&clock, &config, || script.observe()).await;

        assert_eq!(result.unwrap(), None);
        assert_eq!(script.calls(), 2);
    }

    #[tokio::test]
    async fn test_not_found_outside_delete_propagates() {
        let clock = ManualClock::new();
        let script = Script::new(vec![Err(CloudError::NotFound("share".into()))]);

        let err = wait_for_state(&clock, &building_to_active(), || script.observe())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let clock = ManualClock::new();
        let script = Script::new(vec![
            Err(CloudError::api(500, "boom")),
            Ok(Observation::new("share", TestStatus::Active)),
        ]);
        let config = WaitConfig::new(Transition::to_deleted([TestStatus::Active]));

        let err = wait_for_state(&clock, &config, || script.observe())
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::Api { status: 500, .. }));
        assert_eq!(script.calls(), 1);
    }

    #[test]
    fn test_interval_backoff_is_capped() {
        let config = building_to_active().max_interval(Duration::from_secs(10));
        let mut interval = config.min_interval;
        let mut seen = Vec::new();
        for _ in 0..4 {
            interval = config.next_interval(interval);
            seen.push(interval.as_secs());
        }
        assert_eq!(seen, vec![6, 10, 10, 10]);
    }
}
