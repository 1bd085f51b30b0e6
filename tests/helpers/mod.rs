//! Scripted vendor and state builders for driving the gateway without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use jimeng_gateway::app_state::AppState;
use jimeng_gateway::models::job::{Job, JobSpec, RemoteStatus, StatusCheck, VendorStatus};
use jimeng_gateway::services::classifier::{ApiError, RetryPolicy};
use jimeng_gateway::services::generation::GenerationService;
use jimeng_gateway::services::ids::{IdGenerator, SequentialIdGenerator};
use jimeng_gateway::services::orchestrator::TaskOrchestrator;
use jimeng_gateway::services::poller::PollingConfig;
use jimeng_gateway::services::vendor::{DreaminaClient, RemoteJobClient};

use crate::fixtures::JOB_ID;

/// Replays a fixed sequence of status checks. Once the script runs out the
/// last snapshot repeats, or `PROCESSING` with no items if there was none.
pub struct ScriptedClient {
    job_id: String,
    submit_error: Option<ApiError>,
    check_delay: Duration,
    script: Mutex<VecDeque<Result<StatusCheck, ApiError>>>,
    last: Mutex<Option<StatusCheck>>,
    submitted: Mutex<Vec<JobSpec>>,
    submits: AtomicU32,
    checks: AtomicU32,
    completed_checks: AtomicU32,
    prepares: AtomicU32,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::with_job_id(JOB_ID)
    }

    pub fn with_job_id(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            submit_error: None,
            check_delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            submits: AtomicU32::new(0),
            checks: AtomicU32::new(0),
            completed_checks: AtomicU32::new(0),
            prepares: AtomicU32::new(0),
        }
    }

    pub fn rejecting_submit(error: ApiError) -> Self {
        let mut client = Self::new();
        client.submit_error = Some(error);
        client
    }

    /// Every status check takes `delay` before it answers.
    pub fn with_check_delay(mut self, delay: Duration) -> Self {
        self.check_delay = delay;
        self
    }

    pub fn then(self, check: StatusCheck) -> Self {
        self.script.lock().unwrap().push_back(Ok(check));
        self
    }

    pub fn then_error(self, error: ApiError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn submits(&self) -> u32 {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn checks(&self) -> u32 {
        self.checks.load(Ordering::SeqCst)
    }

    /// Status checks that ran to the end rather than being dropped mid-call.
    pub fn completed_checks(&self) -> u32 {
        self.completed_checks.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> u32 {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteJobClient for ScriptedClient {
    async fn submit(&self, spec: &JobSpec) -> Result<String, ApiError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(spec.clone());
        match &self.submit_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.job_id.clone()),
        }
    }

    async fn check_status(&self, job: &Job) -> Result<StatusCheck, ApiError> {
        assert_eq!(job.id, self.job_id, "status check for an unknown job");
        self.checks.fetch_add(1, Ordering::SeqCst);
        if !self.check_delay.is_zero() {
            tokio::time::sleep(self.check_delay).await;
        }
        self.completed_checks.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(check)) => {
                *self.last.lock().unwrap() = Some(check.clone());
                Ok(check)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last.lock().unwrap().clone().unwrap_or_else(|| StatusCheck {
                status: RemoteStatus::new(VendorStatus::Processing, 0),
                record: serde_json::json!({ "status": 20, "item_list": [] }),
            })),
        }
    }

    async fn prepare(&self, _credential: &str) {
        self.prepares.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn image_polling() -> PollingConfig {
    PollingConfig::default().with_max_poll_count(900)
}

pub fn video_polling() -> PollingConfig {
    PollingConfig::default()
        .with_max_poll_count(900)
        .with_timeout(Duration::from_secs(1200))
        .with_initial_delay(Duration::from_secs(5))
}

pub fn generation_service(client: Arc<ScriptedClient>) -> GenerationService {
    let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIdGenerator::new("test"));
    GenerationService::new(
        client,
        ids,
        TaskOrchestrator::new(8),
        image_polling(),
        video_polling(),
    )
}

/// Application state whose generation path runs against `client`.
pub fn test_state(client: Arc<ScriptedClient>) -> AppState {
    let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIdGenerator::new("test"));
    let vendor = DreaminaClient::new(Duration::from_secs(5), RetryPolicy::default(), Arc::clone(&ids))
        .expect("vendor client");
    AppState::new(generation_service(client), Arc::new(vendor), ids)
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
