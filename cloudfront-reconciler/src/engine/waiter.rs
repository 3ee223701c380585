//! Poll-based state waiter.
//!
//! One generic polling loop serves every object kind: callers describe the
//! pending, target and failure statuses in a [`WaitSpec`] and hand over a
//! refresh closure that re-reads the object.
//!
//! # State machine
//!
//! Each tick calls the refresh closure once and classifies the observation:
//!
//! - **absent**: success when the target set is empty (delete waits) or when
//!   the wait is configured with [`Absence::Succeed`]; otherwise tolerated up to
//!   [`Absence::Tolerate`] consecutive times, then reported as not found
//! - **failure status**: stop immediately with `UnexpectedState`
//! - **target status**: success once `min_target_observations` consecutive
//!   target reads have been seen
//! - **pending status**: sleep one poll interval and tick again
//! - **anything else**: `UnexpectedState`; an unmodeled status is never success
//!
//! The deadline is measured from the first tick. When it passes while the
//! object is still pending the wait fails with `Timeout`, carrying the last
//! observed status. Every sleep and every refresh races the cancellation
//! token, which yields `Cancelled`.

use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{Observation, Subject};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

const NO_OBSERVATION: &str = "(none)";
const NOT_FOUND_STATUS: &str = "(not found)";

/// Interval between refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPolicy {
    Fixed(Duration),
    /// Doubling interval starting at `initial`, capped at `max`.
    Backoff { initial: Duration, max: Duration },
}

impl PollPolicy {
    /// Interval to sleep after the `tick`-th refresh (zero-based).
    pub fn interval(&self, tick: u32) -> Duration {
        match *self {
            Self::Fixed(interval) => interval,
            Self::Backoff { initial, max } => {
                let factor = 1u32.checked_shl(tick.min(16)).unwrap_or(u32::MAX);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// What a refresh reporting "does not exist" means for this wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// Absence is the terminal state.
    Succeed,
    /// Tolerate this many consecutive absent reads, then fail with `NotFound`.
    Tolerate(u32),
}

/// Parameters of a single wait. Built fresh for every call.
#[derive(Debug, Clone)]
pub struct WaitSpec {
    subject: Subject,
    pending: Vec<String>,
    target: Vec<String>,
    failure: Vec<String>,
    timeout: Duration,
    delay: Duration,
    poll: PollPolicy,
    progress_interval: Option<Duration>,
    min_target_observations: u32,
    absence: Absence,
}

impl WaitSpec {
    pub fn new(subject: Subject, timeout: Duration) -> Self {
        Self {
            subject,
            pending: Vec::new(),
            target: Vec::new(),
            failure: Vec::new(),
            timeout,
            delay: Duration::ZERO,
            poll: PollPolicy::Fixed(Duration::from_secs(15)),
            progress_interval: None,
            min_target_observations: 1,
            absence: Absence::Tolerate(20),
        }
    }

    #[must_use]
    pub fn pending(mut self, states: &[&str]) -> Self {
        self.pending = states.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn target(mut self, states: &[&str]) -> Self {
        self.target = states.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn failure(mut self, states: &[&str]) -> Self {
        self.failure = states.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Emit an info-level "still waiting" line on this cadence.
    #[must_use]
    pub fn progress_every(mut self, interval: Duration) -> Self {
        self.progress_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn consecutive_targets(mut self, count: u32) -> Self {
        self.min_target_observations = count.max(1);
        self
    }

    #[must_use]
    pub fn on_absent(mut self, absence: Absence) -> Self {
        self.absence = absence;
        self
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn absence_is_terminal(&self) -> bool {
        self.target.is_empty() || self.absence == Absence::Succeed
    }

    fn contains(states: &[String], status: &str) -> bool {
        states.iter().any(|s| s == status)
    }
}

/// Block until the refreshed object reaches a target state.
///
/// Returns `Some(body)` for the final target observation, or `None` when the
/// object is gone and absence is terminal for this spec.
pub async fn wait_for_state<T, F, Fut>(
    spec: &WaitSpec,
    cancel: &CancellationToken,
    mut refresh: F,
) -> ReconcileResult<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ReconcileResult<Observation<T>>>,
{
    log::info!(
        "Waiting for {} to become {:?} (timeout: {:?})",
        spec.subject,
        spec.target,
        spec.timeout
    );

    let mut last_status = NO_OBSERVATION.to_string();

    if !spec.delay.is_zero() {
        pause(spec, cancel, spec.delay, &last_status).await?;
    }

    let started = Instant::now();
    let deadline = started + spec.timeout;
    let mut next_progress = spec.progress_interval.map(|interval| started + interval);
    let mut consecutive_targets = 0u32;
    let mut consecutive_absent = 0u32;
    let mut tick = 0u32;

    loop {
        let observation = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(spec, &last_status)),
            observation = refresh() => observation?,
        };

        match observation {
            Observation::Absent => {
                consecutive_targets = 0;
                last_status = NOT_FOUND_STATUS.to_string();
                if spec.absence_is_terminal() {
                    log::info!("{} no longer exists", spec.subject);
                    return Ok(None);
                }
                consecutive_absent += 1;
                let limit = match spec.absence {
                    Absence::Tolerate(limit) => limit,
                    Absence::Succeed => 0,
                };
                log::debug!(
                    "{} not found while waiting ({consecutive_absent}/{limit})",
                    spec.subject
                );
                if consecutive_absent > limit {
                    return Err(ReconcileError::NotFound {
                        subject: spec.subject.clone(),
                    });
                }
            }
            Observation::Present { body, status } => {
                consecutive_absent = 0;
                log::debug!("{} status: {status}", spec.subject);

                if WaitSpec::contains(&spec.failure, &status) {
                    return Err(unexpected(spec, status));
                }
                if WaitSpec::contains(&spec.target, &status) {
                    consecutive_targets += 1;
                    if consecutive_targets >= spec.min_target_observations {
                        log::info!(
                            "{} reached '{status}' after {:?}",
                            spec.subject,
                            started.elapsed()
                        );
                        return Ok(Some(body));
                    }
                } else if WaitSpec::contains(&spec.pending, &status) {
                    consecutive_targets = 0;
                } else {
                    return Err(unexpected(spec, status));
                }
                last_status = status;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ReconcileError::Timeout {
                subject: spec.subject.clone(),
                last_status,
                target: spec.target.clone(),
                timeout: spec.timeout,
            });
        }

        if let Some(due) = next_progress.filter(|due| now >= *due) {
            log::info!(
                "Still waiting for {} to become {:?} (status: {last_status}, elapsed: {:?})",
                spec.subject,
                spec.target,
                now - started
            );
            next_progress = spec.progress_interval.map(|interval| due + interval);
        }

        let nap = spec.poll.interval(tick).min(deadline - now);
        tick = tick.saturating_add(1);
        pause(spec, cancel, nap, &last_status).await?;
    }
}

async fn pause(
    spec: &WaitSpec,
    cancel: &CancellationToken,
    duration: Duration,
    last_status: &str,
) -> ReconcileResult<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancelled(spec, last_status)),
        () = sleep(duration) => Ok(()),
    }
}

fn cancelled(spec: &WaitSpec, last_status: &str) -> ReconcileError {
    log::warn!("Stopped waiting for {}: cancelled", spec.subject);
    ReconcileError::Cancelled {
        subject: spec.subject.clone(),
        last_status: last_status.to_string(),
    }
}

fn unexpected(spec: &WaitSpec, status: String) -> ReconcileError {
    ReconcileError::UnexpectedState {
        subject: spec.subject.clone(),
        status,
        target: spec.target.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::types::ResourceKind;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn subject() -> Subject {
        Subject::new(ResourceKind::Distribution, "E2QWRUHAPOMQZL".into())
    }

    fn deploy_spec() -> WaitSpec {
        WaitSpec::new(subject(), Duration::from_secs(600))
            .pending(&["InProgress"])
            .target(&["Deployed"])
            .poll(PollPolicy::Fixed(Duration::from_secs(15)))
    }

    /// Refresh that replays `statuses`, repeating the last one forever.
    fn scripted(
        statuses: &[&str],
    ) -> (
        Mutex<VecDeque<Observation<String>>>,
        AtomicU32,
    ) {
        let script = statuses
            .iter()
            .map(|s| {
                if *s == "-" {
                    Observation::Absent
                } else {
                    Observation::present((*s).to_string(), *s)
                }
            })
            .collect();
        (Mutex::new(script), AtomicU32::new(0))
    }

    async fn run(
        spec: &WaitSpec,
        statuses: &[&str],
    ) -> (ReconcileResult<Option<String>>, u32) {
        let (script, calls) = scripted(statuses);
        let cancel = CancellationToken::new();
        let result = wait_for_state(spec, &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut script = script.lock().unwrap();
            let next = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            };
            async move { Ok(next) }
        })
        .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_target_succeeds() {
        let (result, calls) = run(&deploy_spec(), &["InProgress", "InProgress", "Deployed"]).await;
        assert_eq!(result.unwrap().as_deref(), Some("Deployed"));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_targets_required() {
        let spec = deploy_spec().consecutive_targets(2);
        let (result, calls) = run(
            &spec,
            &["Deployed", "InProgress", "Deployed", "Deployed"],
        )
        .await;
        assert!(result.unwrap().is_some());
        assert_eq!(calls, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_state_stops_immediately() {
        let spec = deploy_spec().failure(&["Failed"]);
        let (result, calls) = run(&spec, &["InProgress", "Failed", "Deployed"]).await;
        let err = result.unwrap_err();
        assert!(matches!(err, ReconcileError::UnexpectedState { ref status, .. } if status == "Failed"));
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmodeled_status_is_unexpected() {
        let (result, _) = run(&deploy_spec(), &["InProgress", "Suspended"]).await;
        assert!(matches!(
            result.unwrap_err(),
            ReconcileError::UnexpectedState { status, .. } if status == "Suspended"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_with_empty_target_is_success() {
        let spec = WaitSpec::new(subject(), Duration::from_secs(600))
            .pending(&["InProgress", "Deployed"]);
        let (result, calls) = run(&spec, &["Deployed", "InProgress", "-"]).await;
        assert_eq!(result.unwrap(), None);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_tolerated_then_not_found() {
        let spec = deploy_spec().on_absent(Absence::Tolerate(2));
        let (result, calls) = run(&spec, &["-"]).await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_absent_then_present_resets_tolerance() {
        let spec = deploy_spec().on_absent(Absence::Tolerate(1));
        let (result, _) = run(&spec, &["-", "InProgress", "-", "Deployed"]).await;
        assert!(result.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out_at_deadline() {
        let spec = deploy_spec();
        let started = Instant::now();
        let (result, _) = run(&spec, &["InProgress"]).await;
        let elapsed = started.elapsed();

        match result.unwrap_err() {
            ReconcileError::Timeout { last_status, .. } => assert_eq!(last_status, "InProgress"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(elapsed >= spec.timeout());
        assert!(elapsed <= spec.timeout() + Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_precedes_first_refresh() {
        let spec = deploy_spec().delay(Duration::from_secs(30));
        let started = Instant::now();
        let (result, calls) = run(&spec, &["Deployed"]).await;
        assert!(result.is_ok());
        assert_eq!(calls, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_propagates_unchanged() {
        let cancel = CancellationToken::new();
        let result: ReconcileResult<Option<()>> =
            wait_for_state(&deploy_spec(), &cancel, || async {
                Err(ReconcileError::from_api(
                    crate::error::Operation::Read,
                    subject(),
                    ApiError::generic("AccessDenied"),
                ))
            })
            .await;
        assert!(matches!(result.unwrap_err(), ReconcileError::Api { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_distinct_from_timeout() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(40)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: ReconcileResult<Option<String>> =
            wait_for_state(&deploy_spec(), &cancel, || async {
                Ok(Observation::present("body".to_string(), "InProgress"))
            })
            .await;

        match result.unwrap_err() {
            ReconcileError::Cancelled { last_status, .. } => assert_eq!(last_status, "InProgress"),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(600));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let poll = PollPolicy::Backoff {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
        };
        assert_eq!(poll.interval(0), Duration::from_secs(1));
        assert_eq!(poll.interval(1), Duration::from_secs(2));
        assert_eq!(poll.interval(3), Duration::from_secs(8));
        assert_eq!(poll.interval(4), Duration::from_secs(10));
        assert_eq!(poll.interval(40), Duration::from_secs(10));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn runtime() -> tokio::runtime::Runtime {
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap()
        }

        proptest! {
            #[test]
            fn succeeds_only_after_required_consecutive_targets(
                pending in 0usize..8,
                required in 1u32..4,
            ) {
                let mut statuses = vec!["InProgress"; pending];
                statuses.extend(std::iter::repeat("Deployed").take(required as usize));
                let spec = deploy_spec().consecutive_targets(required);

                let (result, calls) = runtime().block_on(run(&spec, &statuses));
                prop_assert!(result.unwrap().is_some());
                prop_assert_eq!(calls as usize, pending + required as usize);
            }

            #[test]
            fn failure_observation_wins_over_later_targets(
                pending in 0usize..8,
                trailing_targets in 1usize..4,
            ) {
                let mut statuses = vec!["InProgress"; pending];
                statuses.push("Failed");
                statuses.extend(std::iter::repeat("Deployed").take(trailing_targets));
                let spec = deploy_spec().failure(&["Failed"]);

                let (result, calls) = runtime().block_on(run(&spec, &statuses));
                let is_unexpected = matches!(result, Err(ReconcileError::UnexpectedState { .. }));
                prop_assert!(is_unexpected);
                prop_assert_eq!(calls as usize, pending + 1);
            }

            #[test]
            fn always_pending_never_returns_early(timeout_secs in 1u64..3600, interval_secs in 1u64..120) {
                let spec = deploy_spec()
                    .poll(PollPolicy::Fixed(Duration::from_secs(interval_secs)));
                let spec = WaitSpec { timeout: Duration::from_secs(timeout_secs), ..spec };

                let rt = runtime();
                let (result, elapsed) = rt.block_on(async {
                    let started = Instant::now();
                    let (result, _) = run(&spec, &["InProgress"]).await;
                    (result, started.elapsed())
                });
                let timed_out = matches!(result, Err(ReconcileError::Timeout { .. }));
                prop_assert!(timed_out);
                prop_assert!(elapsed >= spec.timeout);
                prop_assert!(elapsed <= spec.timeout + Duration::from_secs(interval_secs));
            }
        }
    }
}
