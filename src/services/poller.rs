//! Adaptive polling state machine.
//!
//! Turns a sequence of remote status checks into one terminal outcome. After
//! every check the exit conditions are evaluated in a fixed priority order:
//!
//! 1. explicit success (SUCCESS/COMPLETED with at least one item)
//! 2. explicit failure (FAILED, whatever the item count)
//! 3. expected item count reached
//! 4. item count stable for `stable_rounds` checks under a success status
//! 5. wall-clock timeout
//! 6. poll-count ceiling
//!
//! The delay before the next check depends on the last snapshot: short when
//! the vendor is finalizing, medium while items are trickling in, long when
//! nothing is happening.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::job::{Job, RemoteStatus, StatusCheck, VendorStatus};
use crate::services::classifier::{self, ApiError};

/// Status-dependent delay between two checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayPolicy {
    /// POST_PROCESSING / FINALIZING.
    pub near_completion: Duration,
    /// PROCESSING with some items already visible.
    pub progressing: Duration,
    /// PROCESSING with nothing visible, or any unrecognized status.
    pub idle: Duration,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            near_completion: Duration::from_secs(2),
            progressing: Duration::from_secs(3),
            idle: Duration::from_secs(5),
        }
    }
}

impl DelayPolicy {
    pub fn delay_for(&self, snapshot: &RemoteStatus) -> Duration {
        match snapshot.status {
            status if status.is_near_completion() => self.near_completion,
            VendorStatus::Processing if snapshot.item_count > 0 => self.progressing,
            _ => self.idle,
        }
    }
}

/// Exit thresholds and delay table for one polling profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    pub max_poll_count: u32,
    pub stable_rounds: u32,
    pub timeout: Duration,
    /// Wait before the first check; the vendor needs a moment to create video records.
    pub initial_delay: Duration,
    pub delays: DelayPolicy,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_poll_count: 40,
            stable_rounds: 3,
            timeout: Duration::from_secs(180),
            initial_delay: Duration::ZERO,
            delays: DelayPolicy::default(),
        }
    }
}

impl PollingConfig {
    pub fn with_max_poll_count(mut self, max_poll_count: u32) -> Self {
        self.max_poll_count = max_poll_count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_stable_rounds(mut self, stable_rounds: u32) -> Self {
        self.stable_rounds = stable_rounds;
        self
    }
}

/// Why a polling session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Success { item_count: u32 },
    Failure { status: VendorStatus, fail_code: Option<String> },
    /// Ceiling hit. `partial_ok` is set when some items had materialized.
    Timeout { item_count: u32, partial_ok: bool },
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { item_count } => write!(f, "success with {item_count} item(s)"),
            Self::Failure { status, fail_code } => match fail_code {
                Some(code) => write!(f, "failure, status {status}, fail code {code}"),
                None => write!(f, "failure, status {status}"),
            },
            Self::Timeout { item_count, .. } => write!(f, "timeout with {item_count} item(s)"),
        }
    }
}

/// Mutable state of one job's polling. Owned by a single loop, never shared.
#[derive(Debug)]
pub struct PollingSession {
    poll_count: u32,
    started_at: Instant,
    last_item_count: u32,
    stable_rounds: u32,
}

impl PollingSession {
    pub fn new(started_at: Instant) -> Self {
        Self {
            poll_count: 0,
            started_at,
            last_item_count: 0,
            stable_rounds: 0,
        }
    }

    pub fn poll_count(&self) -> u32 {
        self.poll_count
    }

    pub fn stable_rounds(&self) -> u32 {
        self.stable_rounds
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record one status check and decide whether the session is over.
    ///
    /// `elapsed` is passed in rather than read from a clock so the rules can be
    /// exercised with arbitrary timings.
    pub fn observe(
        &mut self,
        config: &PollingConfig,
        expected_item_count: Option<u32>,
        snapshot: &RemoteStatus,
        elapsed: Duration,
    ) -> Option<ExitReason> {
        self.poll_count += 1;
        let status = snapshot.status;
        let item_count = snapshot.item_count;

        if status.is_success() && item_count > 0 {
            return Some(ExitReason::Success { item_count });
        }

        if status == VendorStatus::Failed {
            return Some(ExitReason::Failure {
                status,
                fail_code: snapshot.fail_code.clone(),
            });
        }

        if let Some(expected) = expected_item_count {
            if item_count >= expected {
                return Some(ExitReason::Success { item_count });
            }
        }

        if item_count > 0 && item_count == self.last_item_count {
            self.stable_rounds += 1;
            if self.stable_rounds >= config.stable_rounds && status.is_success() {
                return Some(ExitReason::Success { item_count });
            }
        } else {
            self.stable_rounds = 0;
            self.last_item_count = item_count;
        }

        if elapsed > config.timeout || self.poll_count >= config.max_poll_count {
            return Some(ExitReason::Timeout {
                item_count,
                partial_ok: item_count > 0,
            });
        }

        None
    }
}

/// Progress of a running session, reported after every check.
#[derive(Debug, Clone, PartialEq)]
pub struct PollProgress {
    pub job_id: String,
    pub poll_count: u32,
    pub status: VendorStatus,
    pub item_count: u32,
    pub elapsed: Duration,
}

/// Receiver of progress notices. Must not block the polling loop.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &PollProgress);
}

/// Terminal result of a session that did not end in an error.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Raw vendor record from the final check.
    pub record: serde_json::Value,
    pub item_count: u32,
    pub poll_count: u32,
    pub elapsed: Duration,
    pub exit: ExitReason,
}

impl PollOutcome {
    /// Timed out, but with some items to hand back.
    pub fn is_partial(&self) -> bool {
        matches!(self.exit, ExitReason::Timeout { .. })
    }
}

/// Drives one [`PollingSession`] against a status-check function.
pub struct Poller {
    config: PollingConfig,
    cancel: CancellationToken,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl Poller {
    pub fn new(config: PollingConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Abandon the session at the next loop boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Poll `job` until an exit condition matches.
    ///
    /// A failed check aborts immediately with its classification; the loop
    /// never retries a check itself.
    pub async fn run<F, Fut>(&self, job: &Job, mut check: F) -> Result<PollOutcome, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<StatusCheck, ApiError>>,
    {
        let mut session = PollingSession::new(Instant::now());

        if !self.config.initial_delay.is_zero() {
            tracing::info!(
                job_id = %job.id,
                delay_ms = self.config.initial_delay.as_millis() as u64,
                "Waiting before first status check"
            );
            self.pause(self.config.initial_delay).await?;
        }

        loop {
            if self.cancel.is_cancelled() {
                return Err(self.abandoned(job, &session));
            }

            tracing::info!(
                job_id = %job.id,
                kind = %job.kind,
                poll = session.poll_count() + 1,
                elapsed_secs = session.elapsed().as_secs_f64(),
                "Checking job status"
            );

            let StatusCheck { status: snapshot, record } = check().await.map_err(|err| {
                tracing::error!(job_id = %job.id, kind = %err.kind, error = %err.message, "Status check failed");
                err
            })?;

            tracing::debug!(
                job_id = %job.id,
                status = %snapshot.status,
                item_count = snapshot.item_count,
                fail_code = snapshot.fail_code.as_deref().unwrap_or(""),
                "Status snapshot"
            );
            if snapshot.status.is_success() && snapshot.item_count == 0 {
                tracing::warn!(job_id = %job.id, status = %snapshot.status, "Vendor reported success with no items");
            }

            let elapsed = session.elapsed();
            let exit = session.observe(&self.config, job.expected_item_count, &snapshot, elapsed);

            if let Some(sink) = &self.progress {
                sink.report(&PollProgress {
                    job_id: job.id.clone(),
                    poll_count: session.poll_count(),
                    status: snapshot.status,
                    item_count: snapshot.item_count,
                    elapsed,
                });
            }

            if let Some(exit) = exit {
                return self.finish(job, &session, &snapshot, exit, record, elapsed);
            }

            let delay = self.config.delays.delay_for(&snapshot);
            tracing::debug!(job_id = %job.id, delay_ms = delay.as_millis() as u64, "Waiting before next status check");
            if let Err(err) = self.pause(delay).await {
                tracing::info!(job_id = %job.id, polls = session.poll_count(), "Polling abandoned by caller");
                return Err(err);
            }
        }
    }

    async fn pause(&self, delay: Duration) -> Result<(), ApiError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(ApiError::cancelled()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn abandoned(&self, job: &Job, session: &PollingSession) -> ApiError {
        tracing::info!(job_id = %job.id, polls = session.poll_count(), "Polling abandoned by caller");
        ApiError::cancelled()
    }

    fn finish(
        &self,
        job: &Job,
        session: &PollingSession,
        last: &RemoteStatus,
        exit: ExitReason,
        record: serde_json::Value,
        elapsed: Duration,
    ) -> Result<PollOutcome, ApiError> {
        tracing::info!(
            job_id = %job.id,
            polls = session.poll_count(),
            elapsed_secs = elapsed.as_secs_f64(),
            reason = %exit,
            "Polling finished"
        );

        match &exit {
            ExitReason::Success { .. } => {}
            ExitReason::Failure { status, fail_code } => {
                let err = classifier::classify_generation_failure(job.kind, *status, fail_code.as_deref());
                tracing::error!(job_id = %job.id, kind = %err.kind, error = %err.message, "Generation failed");
                return Err(err);
            }
            ExitReason::Timeout { partial_ok: true, item_count } => {
                tracing::warn!(
                    job_id = %job.id,
                    item_count,
                    expected = job.expected_item_count.unwrap_or(0),
                    "Polling timed out, returning partial results"
                );
            }
            ExitReason::Timeout { partial_ok: false, .. } => {
                return Err(ApiError::generation_failed(format!(
                    "{} generation timed out after {} checks ({:.0}s) with no results, last status {}",
                    job.kind,
                    session.poll_count(),
                    elapsed.as_secs_f64(),
                    last.status,
                )));
            }
        }

        Ok(PollOutcome {
            record,
            item_count: last.item_count,
            poll_count: session.poll_count(),
            elapsed,
            exit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobKind;
    use crate::services::classifier::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn snap(status: VendorStatus, items: u32) -> RemoteStatus {
        RemoteStatus::new(status, items)
    }

    fn observe_all(
        config: &PollingConfig,
        expected: Option<u32>,
        snapshots: &[RemoteStatus],
    ) -> (Option<ExitReason>, u32) {
        let mut session = PollingSession::new(Instant::now());
        for snapshot in snapshots {
            if let Some(exit) = session.observe(config, expected, snapshot, Duration::ZERO) {
                return (Some(exit), session.poll_count());
            }
        }
        (None, session.poll_count())
    }

    /// Status-check function that replays a fixed script and counts calls.
    fn scripted(
        snapshots: Vec<RemoteStatus>,
        calls: &AtomicU32,
    ) -> impl FnMut() -> std::future::Ready<Result<StatusCheck, ApiError>> + '_ {
        let script = Mutex::new(snapshots.into_iter());
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let next = script.lock().unwrap().next();
            std::future::ready(match next {
                Some(status) => Ok(StatusCheck {
                    status,
                    record: serde_json::json!({ "item_list": [] }),
                }),
                None => Err(ApiError::new(ErrorKind::Unknown, "script exhausted")),
            })
        }
    }

    fn job(expected: u32) -> Job {
        Job::new("history-1", JobKind::Image, "token").expecting(expected)
    }

    #[test]
    fn test_success_exits_on_first_success_snapshot() {
        let config = PollingConfig::default();
        let (exit, polls) = observe_all(
            &config,
            None,
            &[
                snap(VendorStatus::Processing, 0),
                snap(VendorStatus::Processing, 1),
                snap(VendorStatus::Success, 2),
                snap(VendorStatus::Success, 4),
            ],
        );
        assert_eq!(exit, Some(ExitReason::Success { item_count: 2 }));
        assert_eq!(polls, 3);
    }

    #[test]
    fn test_completed_counts_as_success() {
        let (exit, _) = observe_all(&PollingConfig::default(), None, &[snap(VendorStatus::Completed, 1)]);
        assert_eq!(exit, Some(ExitReason::Success { item_count: 1 }));
    }

    #[test]
    fn test_failure_wins_regardless_of_items() {
        let (exit, polls) = observe_all(
            &PollingConfig::default(),
            Some(1),
            &[
                snap(VendorStatus::Failed, 3).with_fail_code("4001"),
                snap(VendorStatus::Success, 4),
            ],
        );
        assert_eq!(
            exit,
            Some(ExitReason::Failure {
                status: VendorStatus::Failed,
                fail_code: Some("4001".into()),
            })
        );
        assert_eq!(polls, 1);
    }

    #[test]
    fn test_expected_count_exits_while_still_processing() {
        let (exit, polls) = observe_all(
            &PollingConfig::default(),
            Some(4),
            &[snap(VendorStatus::Processing, 2), snap(VendorStatus::Processing, 4)],
        );
        assert_eq!(exit, Some(ExitReason::Success { item_count: 4 }));
        assert_eq!(polls, 2);
    }

    #[test]
    fn test_success_with_zero_items_keeps_polling() {
        let config = PollingConfig::default().with_max_poll_count(100);
        let (exit, polls) = observe_all(&config, Some(4), &vec![snap(VendorStatus::Success, 0); 10]);
        assert_eq!(exit, None);
        assert_eq!(polls, 10);
    }

    #[test]
    fn test_stable_rounds_reset_when_item_count_changes() {
        let config = PollingConfig::default().with_max_poll_count(100);
        let mut session = PollingSession::new(Instant::now());
        for items in [2, 2, 2] {
            session.observe(&config, None, &snap(VendorStatus::Processing, items), Duration::ZERO);
        }
        assert_eq!(session.stable_rounds(), 2);

        session.observe(&config, None, &snap(VendorStatus::Processing, 3), Duration::ZERO);
        assert_eq!(session.stable_rounds(), 0);

        session.observe(&config, None, &snap(VendorStatus::Processing, 3), Duration::ZERO);
        assert_eq!(session.stable_rounds(), 1);
    }

    #[test]
    fn test_partial_progress_then_success_exits_on_fourth_check() {
        let config = PollingConfig::default().with_stable_rounds(3);
        let (exit, polls) = observe_all(
            &config,
            None,
            &[
                snap(VendorStatus::Processing, 0),
                snap(VendorStatus::Processing, 2),
                snap(VendorStatus::Processing, 2),
                snap(VendorStatus::Success, 2),
            ],
        );
        assert_eq!(exit, Some(ExitReason::Success { item_count: 2 }));
        assert_eq!(polls, 4);
    }

    #[test]
    fn test_poll_ceiling_times_out_with_partial_flag() {
        let config = PollingConfig::default().with_max_poll_count(5);
        let (exit, polls) = observe_all(&config, Some(4), &vec![snap(VendorStatus::Processing, 3); 10]);
        assert_eq!(exit, Some(ExitReason::Timeout { item_count: 3, partial_ok: true }));
        assert_eq!(polls, 5);

        let (exit, _) = observe_all(&config, Some(4), &vec![snap(VendorStatus::Processing, 0); 10]);
        assert_eq!(exit, Some(ExitReason::Timeout { item_count: 0, partial_ok: false }));
    }

    #[test]
    fn test_elapsed_ceiling_is_strictly_greater_than() {
        let config = PollingConfig::default().with_timeout(Duration::from_secs(10));
        let mut session = PollingSession::new(Instant::now());
        let processing = snap(VendorStatus::Processing, 0);
        assert_eq!(session.observe(&config, None, &processing, Duration::from_secs(10)), None);
        assert_eq!(
            session.observe(&config, None, &processing, Duration::from_millis(10_001)),
            Some(ExitReason::Timeout { item_count: 0, partial_ok: false })
        );
    }

    #[test]
    fn test_delay_tightens_as_completion_approaches() {
        let delays = DelayPolicy::default();
        assert_eq!(delays.delay_for(&snap(VendorStatus::Processing, 0)), Duration::from_secs(5));
        assert_eq!(delays.delay_for(&snap(VendorStatus::Processing, 1)), Duration::from_secs(3));
        assert_eq!(delays.delay_for(&snap(VendorStatus::PostProcessing, 0)), Duration::from_secs(2));
        assert_eq!(delays.delay_for(&snap(VendorStatus::Finalizing, 2)), Duration::from_secs(2));
        assert_eq!(delays.delay_for(&snap(VendorStatus::Unrecognized(77), 2)), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_snapshot_stops_polling_with_classified_error() {
        let calls = AtomicU32::new(0);
        let check = scripted(
            vec![
                snap(VendorStatus::Failed, 0).with_fail_code("4001"),
                snap(VendorStatus::Success, 4),
            ],
            &calls,
        );

        let err = Poller::new(PollingConfig::default()).run(&job(4), check).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ContentFiltered);
        assert_eq!(err.http_status, 400);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_with_items_is_partial_success() {
        let calls = AtomicU32::new(0);
        let check = scripted(vec![snap(VendorStatus::Processing, 3); 10], &calls);
        let config = PollingConfig::default().with_max_poll_count(5);

        let outcome = Poller::new(config).run(&job(4), check).await.unwrap();
        assert!(outcome.is_partial());
        assert_eq!(outcome.item_count, 3);
        assert_eq!(outcome.poll_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_items_is_generation_failed() {
        let calls = AtomicU32::new(0);
        let check = scripted(vec![snap(VendorStatus::Processing, 0); 10], &calls);
        let config = PollingConfig::default().with_max_poll_count(5);

        let err = Poller::new(config).run(&job(4), check).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::GenerationFailed);
        assert_eq!(err.http_status, 429);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_clock_timeout_uses_adaptive_delays() {
        let calls = AtomicU32::new(0);
        let check = scripted(vec![snap(VendorStatus::Processing, 0); 10], &calls);
        let config = PollingConfig::default().with_timeout(Duration::from_secs(10));

        // Idle delay is 5s: checks land at 0s, 5s, 10s and 15s; only the last exceeds 10s.
        let err = Poller::new(config).run(&job(4), check).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::GenerationFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_error_aborts_without_retry() {
        let calls = AtomicU32::new(0);
        let check = scripted(vec![snap(VendorStatus::Processing, 0)], &calls);

        let err = Poller::new(PollingConfig::default()).run(&job(4), check).await.unwrap_err();
        assert_eq!(err.message, "script exhausted");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_between_checks() {
        struct CancelOnFirstReport(CancellationToken);
        impl ProgressSink for CancelOnFirstReport {
            fn report(&self, _progress: &PollProgress) {
                self.0.cancel();
            }
        }

        let calls = AtomicU32::new(0);
        let check = scripted(vec![snap(VendorStatus::Processing, 0); 10], &calls);
        let cancel = CancellationToken::new();
        let poller = Poller::new(PollingConfig::default())
            .with_cancellation(cancel.clone())
            .with_progress(Arc::new(CancelOnFirstReport(cancel)));

        let err = poller.run(&job(4), check).await.unwrap_err();
        assert_eq!(err, ApiError::cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_precedes_first_check() {
        let calls = AtomicU32::new(0);
        let check = scripted(vec![snap(VendorStatus::Success, 1)], &calls);
        let config = PollingConfig::default().with_initial_delay(Duration::from_secs(5));

        let started = Instant::now();
        let outcome = Poller::new(config).run(&job(1), check).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(outcome.exit, ExitReason::Success { item_count: 1 });
    }
}
