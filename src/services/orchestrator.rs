//! Submit-then-poll task runner.
//!
//! [`TaskOrchestrator::execute_task`] is the blocking form used by the plain
//! JSON endpoints. [`TaskOrchestrator::spawn_streaming`] runs the same work on
//! a background task and feeds progress, the final result, and a completion
//! marker into a bounded channel for the SSE endpoint.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::services::classifier::{ApiError, ErrorKind};
use crate::services::poller::{PollProgress, ProgressSink};

/// Events delivered to a streaming consumer, in order: zero or more
/// `Progress`, exactly one `Finished`, then `Done`. The channel closes after
/// `Done`.
#[derive(Debug)]
pub enum TaskEvent<T> {
    Progress(PollProgress),
    Finished(Result<T, ApiError>),
    Done,
}

/// Handles given to a streaming task body.
#[derive(Clone)]
pub struct TaskContext {
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
}

/// Forwards progress into the event channel without waiting for room.
struct ChannelProgressSink<T> {
    tx: mpsc::Sender<TaskEvent<T>>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> ProgressSink for ChannelProgressSink<T> {
    fn report(&self, progress: &PollProgress) {
        match self.tx.try_send(TaskEvent::Progress(progress.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!(job_id = %progress.job_id, "Progress channel full, dropping update");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::info!(job_id = %progress.job_id, "Stream consumer went away, cancelling job");
                self.cancel.cancel();
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskOrchestrator {
    stream_capacity: usize,
}

impl TaskOrchestrator {
    pub fn new(stream_capacity: usize) -> Self {
        Self {
            stream_capacity: stream_capacity.max(1),
        }
    }

    /// Submit a job, then poll it to a terminal result.
    ///
    /// An empty job id fails immediately: polling an empty id would only burn
    /// the whole poll budget. No retry happens at this level.
    pub async fn execute_task<T, S, SFut, P, PFut>(&self, submit: S, poll: P) -> Result<T, ApiError>
    where
        S: FnOnce() -> SFut,
        SFut: Future<Output = Result<String, ApiError>>,
        P: FnOnce(String) -> PFut,
        PFut: Future<Output = Result<T, ApiError>>,
    {
        let job_id = submit().await?;
        if job_id.trim().is_empty() {
            tracing::error!("Task submission returned an empty job id");
            return Err(ApiError::new(
                ErrorKind::Unknown,
                "task submission returned an empty job id",
            ));
        }

        tracing::info!(job_id = %job_id, "Task submitted, polling for result");
        poll(job_id).await
    }

    /// Run `task` in the background and stream its events.
    ///
    /// Dropping the receiver, or firing `cancel`, abandons the task at its next
    /// cancellation point. The task is never dropped mid-step, so a remote call
    /// already in flight always completes.
    pub fn spawn_streaming<T, F, Fut>(
        &self,
        cancel: CancellationToken,
        task: F,
    ) -> mpsc::Receiver<TaskEvent<T>>
    where
        T: Send + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.stream_capacity);
        let ctx = TaskContext {
            progress: Arc::new(ChannelProgressSink {
                tx: tx.clone(),
                cancel: cancel.clone(),
            }),
            cancel,
        };

        tokio::spawn(async move {
            let result = task(ctx).await;

            if let Err(err) = &result {
                tracing::warn!(kind = %err.kind, error = %err.message, "Streaming task ended with error");
            }

            if tx.send(TaskEvent::Finished(result)).await.is_err() {
                tracing::debug!("Stream consumer gone before final result");
                return;
            }
            let _ = tx.send(TaskEvent::Done).await;
        });

        rx
    }
}

impl Default for TaskOrchestrator {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::VendorStatus;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn progress(poll_count: u32) -> PollProgress {
        PollProgress {
            job_id: "history-1".into(),
            poll_count,
            status: VendorStatus::Processing,
            item_count: 0,
            elapsed: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_empty_job_id_fails_without_polling() {
        let polled = AtomicBool::new(false);
        let result: Result<u32, _> = TaskOrchestrator::default()
            .execute_task(
                || async { Ok("   ".to_string()) },
                |_| async {
                    polled.store(true, Ordering::SeqCst);
                    Ok(1)
                },
            )
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(err.message.contains("empty job id"));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_submit_error_passes_through() {
        let result: Result<u32, _> = TaskOrchestrator::default()
            .execute_task(
                || async { Err(ApiError::new(ErrorKind::InsufficientCredit, "no credit")) },
                |_| async { Ok(1) },
            )
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::InsufficientCredit);
    }

    #[tokio::test]
    async fn test_job_id_is_handed_to_poll() {
        let result = TaskOrchestrator::default()
            .execute_task(|| async { Ok("history-9".to_string()) }, |id| async move { Ok(id) })
            .await;
        assert_eq!(result.unwrap(), "history-9");
    }

    #[tokio::test]
    async fn test_stream_ends_with_finished_then_done() {
        let mut rx = TaskOrchestrator::default().spawn_streaming(CancellationToken::new(), |ctx| async move {
            ctx.progress.report(&progress(1));
            ctx.progress.report(&progress(2));
            Ok::<_, ApiError>("done".to_string())
        });

        let mut polls = Vec::new();
        let mut finished = None;
        let mut saw_done = false;
        while let Some(event) = rx.recv().await {
            assert!(!saw_done, "event received after Done");
            match event {
                TaskEvent::Progress(p) => polls.push(p.poll_count),
                TaskEvent::Finished(result) => finished = Some(result),
                TaskEvent::Done => saw_done = true,
            }
        }

        assert_eq!(polls, vec![1, 2]);
        assert_eq!(finished.unwrap().unwrap(), "done");
        assert!(saw_done);
    }

    #[tokio::test]
    async fn test_stream_delivers_failure_before_done() {
        let mut rx = TaskOrchestrator::default().spawn_streaming(CancellationToken::new(), |_ctx| async move {
            Err::<(), _>(ApiError::generation_failed("boom"))
        });

        match rx.recv().await {
            Some(TaskEvent::Finished(Err(err))) => assert_eq!(err.kind, ErrorKind::GenerationFailed),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(rx.recv().await, Some(TaskEvent::Done)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_lets_in_flight_step_finish() {
        let cancel = CancellationToken::new();
        let step_completed = Arc::new(AtomicBool::new(false));
        let completed = Arc::clone(&step_completed);

        let mut rx = TaskOrchestrator::default().spawn_streaming(cancel.clone(), move |ctx| async move {
            // stands in for a slow remote call
            tokio::time::sleep(Duration::from_secs(10)).await;
            completed.store(true, Ordering::SeqCst);
            if ctx.cancel.is_cancelled() {
                return Err(ApiError::cancelled());
            }
            Ok::<_, ApiError>(())
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        match rx.recv().await {
            Some(TaskEvent::Finished(Err(err))) => assert_eq!(err, ApiError::cancelled()),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(step_completed.load(Ordering::SeqCst));
        assert!(matches!(rx.recv().await, Some(TaskEvent::Done)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_cancels_on_next_report() {
        let cancel = CancellationToken::new();
        let (reported_tx, reported_rx) = tokio::sync::oneshot::channel::<()>();
        let (resume_tx, resume_rx) = tokio::sync::oneshot::channel::<()>();
        let observed = cancel.clone();

        let rx = TaskOrchestrator::default().spawn_streaming(cancel, move |ctx| async move {
            let _ = reported_tx.send(());
            let _ = resume_rx.await;
            ctx.progress.report(&progress(1));
            Ok::<_, ApiError>(())
        });

        reported_rx.await.unwrap();
        drop(rx);
        resume_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), observed.cancelled())
            .await
            .expect("task should be cancelled once the consumer is gone");
    }
}
