// ── Async job poller ──
//
// Drives repeated status checks for operations that finish after the
// initiating call returns. Intervals start at the policy's base, double up to
// its cap, and the loop gives up at the policy deadline. The remote job is
// never cancelled or rolled back from here.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use ontapkit_api::{JobLink, JobRecord, JobState, RestClient, Transport, classify};

use crate::config::PollPolicy;
use crate::error::{CoreError, ErrorKind};

/// Result of one status check.
#[derive(Debug)]
pub enum PollState<T> {
    Pending,
    Succeeded(T),
    Failed(CoreError),
}

/// Lifecycle phase of an [`AsyncJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum JobPhase {
    Pending,
    Success,
    Failed,
}

/// Book-keeping for one polled operation.
#[derive(Debug, Clone)]
pub struct AsyncJob {
    status_path: String,
    phase: JobPhase,
    attempts: u32,
    next_interval: Duration,
    backoff: Vec<Duration>,
}

impl AsyncJob {
    pub fn new(status_path: impl Into<String>, policy: &PollPolicy) -> Self {
        Self {
            status_path: status_path.into(),
            phase: JobPhase::Pending,
            attempts: 0,
            next_interval: policy.base_interval,
            backoff: Vec::new(),
        }
    }

    pub fn status_path(&self) -> &str {
        &self.status_path
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Status checks performed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn next_interval(&self) -> Duration {
        self.next_interval
    }

    /// Backoff interval scheduled after each pending check, in order. The
    /// actual sleep is clipped to the deadline.
    pub fn backoff_history(&self) -> &[Duration] {
        &self.backoff
    }
}

/// Polls status checks under one shared [`PollPolicy`].
#[derive(Debug, Clone)]
pub struct Poller {
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Call `status_check` until it reports a terminal state.
    ///
    /// Transport failures during a status check count as "still pending";
    /// any other error ends the loop. Returns [`CoreError::Timeout`] once the
    /// deadline passes, even while a status check is still in flight, and
    /// [`CoreError::Cancelled`] if the token fires.
    pub async fn await_completion<T, F, Fut>(
        &self,
        job: &mut AsyncJob,
        status_check: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollState<T>, CoreError>>,
    {
        self.poll(job, None, status_check).await
    }

    /// [`await_completion`](Self::await_completion) that also stops when
    /// `cancel` fires. The poller's own token still applies.
    pub async fn await_completion_with<T, F, Fut>(
        &self,
        job: &mut AsyncJob,
        cancel: &CancellationToken,
        status_check: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollState<T>, CoreError>>,
    {
        self.poll(job, Some(cancel), status_check).await
    }

    async fn poll<T, F, Fut>(
        &self,
        job: &mut AsyncJob,
        call: Option<&CancellationToken>,
        mut status_check: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollState<T>, CoreError>>,
    {
        let deadline = Instant::now() + self.policy.timeout;
        let timed_out = |job: &AsyncJob| CoreError::Timeout {
            operation: job.status_path.clone(),
            waited_secs: self.policy.timeout.as_secs(),
        };

        loop {
            job.attempts += 1;
            let state = tokio::select! {
                biased;
                () = cancelled(&self.cancel, call) => return Err(CoreError::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Err(timed_out(job)),
                state = status_check() => state,
            };

            match state {
                Ok(PollState::Succeeded(value)) => {
                    job.phase = JobPhase::Success;
                    debug!(path = %job.status_path, attempts = job.attempts, "job succeeded");
                    return Ok(value);
                }
                Ok(PollState::Failed(err)) => {
                    job.phase = JobPhase::Failed;
                    debug!(path = %job.status_path, attempts = job.attempts, error = %err, "job failed");
                    return Err(err);
                }
                Ok(PollState::Pending) => {}
                Err(err) if err.kind() == ErrorKind::Transport => {
                    warn!(path = %job.status_path, error = %err, "status check failed, will retry");
                }
                Err(err) => return Err(err),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out(job));
            }

            let interval = job.next_interval;
            job.backoff.push(interval);
            let sleep_for = interval.min(deadline - now);
            trace!(
                path = %job.status_path,
                attempt = job.attempts,
                sleep_ms = u64::try_from(sleep_for.as_millis()).unwrap_or(u64::MAX),
                "job pending"
            );

            tokio::select! {
                biased;
                () = cancelled(&self.cancel, call) => return Err(CoreError::Cancelled),
                () = tokio::time::sleep(sleep_for) => {}
            }

            job.next_interval = interval.saturating_mul(2).min(self.policy.max_interval);
        }
    }

    /// Poll `cluster/jobs/{uuid}` until the job succeeds or fails. `cancel`
    /// is observed between checks and inside each status request, alongside
    /// the poller's own token.
    ///
    /// A job that fails with a not-found code surfaces as
    /// [`CoreError::NotFound`]; callers decide what that means for them.
    pub async fn await_job<T: Transport>(
        &self,
        client: &RestClient<T>,
        link: &JobLink,
        cancel: &CancellationToken,
    ) -> Result<JobRecord, CoreError> {
        let mut job = AsyncJob::new(link.status_path(), &self.policy);
        let op = link.status_operation();
        let op = &op;

        debug!(job = %link.uuid, "waiting for job");
        self.poll(&mut job, Some(cancel), move || async move {
            Ok::<_, CoreError>(job_state(client.execute_with(op, cancel).await?))
        })
        .await
    }
}

/// Resolves once `root` or, when given, `call` is cancelled.
async fn cancelled(root: &CancellationToken, call: Option<&CancellationToken>) {
    match call {
        Some(call) => tokio::select! {
            () = root.cancelled() => {}
            () = call.cancelled() => {}
        },
        None => root.cancelled().await,
    }
}

fn job_state(record: JobRecord) -> PollState<JobRecord> {
    match record.state {
        JobState::Success => PollState::Succeeded(record),
        JobState::Failure => PollState::Failed(job_failure(&record)),
        JobState::Queued | JobState::Running | JobState::Paused | JobState::Unknown => {
            PollState::Pending
        }
    }
}

/// Classify a failed job by its code; jobs carry no HTTP status.
fn job_failure(record: &JobRecord) -> CoreError {
    let code = record.code.unwrap_or(0);
    let message = record
        .message
        .clone()
        .unwrap_or_else(|| format!("job {} failed", record.uuid));
    CoreError::from_remote(classify(0, code), None, code, message, None)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    fn policy(base: u64, max: u64, timeout: u64) -> PollPolicy {
        PollPolicy {
            base_interval: Duration::from_secs(base),
            max_interval: Duration::from_secs(max),
            timeout: Duration::from_secs(timeout),
        }
    }

    /// Status check answering from a script; repeats `Pending` once it runs out.
    fn scripted(
        states: Vec<PollState<&'static str>>,
    ) -> impl FnMut() -> std::future::Ready<Result<PollState<&'static str>, CoreError>> {
        let queue = Arc::new(Mutex::new(VecDeque::from(states)));
        move || {
            let next = queue.lock().unwrap().pop_front().unwrap_or(PollState::Pending);
            std::future::ready(Ok(next))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_pending_checks() {
        let poller = Poller::new(policy(1, 360, 600), CancellationToken::new());
        let mut job = AsyncJob::new("cluster/jobs/j-1", poller.policy());

        let check = scripted(vec![
            PollState::Pending,
            PollState::Pending,
            PollState::Succeeded("done"),
        ]);
        let value = poller.await_completion(&mut job, check).await.unwrap();

        assert_eq!(value, "done");
        assert_eq!(job.attempts(), 3);
        assert_eq!(job.phase(), JobPhase::Success);
        assert_eq!(
            job.backoff_history(),
            &[Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_non_decreasing_and_capped() {
        let poller = Poller::new(policy(1, 8, 3600), CancellationToken::new());
        let mut job = AsyncJob::new("cluster/jobs/j-2", poller.policy());

        let mut states: Vec<_> = (0..9).map(|_| PollState::Pending).collect();
        states.push(PollState::Succeeded("ok"));
        poller.await_completion(&mut job, scripted(states)).await.unwrap();

        let history = job.backoff_history();
        assert_eq!(history.len(), 9);
        assert!(history.windows(2).all(|w| w[0] <= w[1]), "{history:?}");
        assert!(history.iter().all(|d| *d <= Duration::from_secs(8)));
        assert_eq!(history.last(), Some(&Duration::from_secs(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn all_pending_times_out_at_deadline() {
        let poller = Poller::new(policy(1, 4, 20), CancellationToken::new());
        let mut job = AsyncJob::new("cluster/jobs/j-3", poller.policy());

        let started = Instant::now();
        let err = poller
            .await_completion(&mut job, scripted(Vec::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Timeout { waited_secs: 20, .. }), "{err:?}");
        assert_eq!(started.elapsed(), Duration::from_secs(20));
        assert_eq!(job.phase(), JobPhase::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_is_returned() {
        let poller = Poller::new(policy(1, 4, 60), CancellationToken::new());
        let mut job = AsyncJob::new("cluster/jobs/j-4", poller.policy());

        let check = scripted(vec![
            PollState::Pending,
            PollState::Failed(CoreError::Conflict {
                message: "duplicate entry".into(),
                code: Some(1),
            }),
        ]);
        let err = poller.await_completion(&mut job, check).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(job.phase(), JobPhase::Failed);
        assert_eq!(job.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_other_errors_are_not() {
        let poller = Poller::new(policy(1, 4, 60), CancellationToken::new());

        let mut calls = 0;
        let mut job = AsyncJob::new("cluster/jobs/j-5", poller.policy());
        let value = poller
            .await_completion(&mut job, || {
                calls += 1;
                std::future::ready(if calls == 1 {
                    Err(CoreError::Transport {
                        reason: "connection reset".into(),
                    })
                } else {
                    Ok(PollState::Succeeded(calls))
                })
            })
            .await
            .unwrap();
        assert_eq!(value, 2);

        let mut job = AsyncJob::new("cluster/jobs/j-6", poller.policy());
        let err = poller
            .await_completion(&mut job, || {
                std::future::ready(Err::<PollState<()>, _>(CoreError::Permission {
                    message: "denied".into(),
                    code: Some(6),
                }))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(job.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_the_sleep() {
        let cancel = CancellationToken::new();
        let poller = Poller::new(policy(30, 360, 3600), cancel.clone());

        let handle = tokio::spawn(async move {
            let mut job = AsyncJob::new("cluster/jobs/j-7", poller.policy());
            poller.await_completion(&mut job, scripted(Vec::new())).await
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_status_check_times_out_at_deadline() {
        let poller = Poller::new(policy(1, 4, 10), CancellationToken::new());
        let mut job = AsyncJob::new("cluster/jobs/j-9", poller.policy());

        let started = Instant::now();
        let err = poller
            .await_completion(&mut job, || async {
                tokio::time::sleep(Duration::from_secs(100)).await;
                Ok(PollState::Succeeded(()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Timeout { waited_secs: 10, .. }), "{err:?}");
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(job.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn call_token_cancels_without_touching_the_poller() {
        let root = CancellationToken::new();
        let poller = Poller::new(policy(30, 360, 3600), root.clone());
        let call = CancellationToken::new();

        let waiter = {
            let poller = poller.clone();
            let call = call.clone();
            tokio::spawn(async move {
                let mut job = AsyncJob::new("cluster/jobs/j-10", poller.policy());
                poller
                    .await_completion_with(&mut job, &call, scripted(Vec::new()))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        call.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(!root.is_cancelled());

        let mut job = AsyncJob::new("cluster/jobs/j-11", poller.policy());
        let value = poller
            .await_completion(&mut job, scripted(vec![PollState::Succeeded("later")]))
            .await
            .unwrap();
        assert_eq!(value, "later");
    }

    #[test]
    fn job_failure_uses_code_classification() {
        let record = JobRecord {
            uuid: "j-8".into(),
            state: JobState::Failure,
            message: Some("entry doesn't exist".into()),
            code: Some(4),
            description: None,
        };
        assert_eq!(job_failure(&record).kind(), ErrorKind::NotFound);

        let record = JobRecord {
            code: None,
            message: None,
            ..record
        };
        let err = job_failure(&record);
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.to_string().contains("job j-8 failed"));
    }
}
