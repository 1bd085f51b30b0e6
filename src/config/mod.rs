use std::time::Duration;

use serde::Deserialize;

use crate::services::classifier::RetryPolicy;
use crate::services::poller::PollingConfig;

const VIDEO_TIMEOUT: Duration = Duration::from_secs(1200);
const VIDEO_INITIAL_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:5100")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Poll ceiling for both media profiles. The wall-clock timeout is
    /// what normally bounds a job.
    #[serde(default = "default_max_poll_count")]
    pub max_poll_count: u32,

    /// Consecutive unchanged snapshots that count as settled
    #[serde(default = "default_stable_rounds")]
    pub stable_rounds: u32,

    /// Wall-clock polling budget for images, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retries after the first attempt of a vendor request
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request HTTP timeout towards the vendor
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Buffered progress events per SSE stream
    #[serde(default = "default_stream_channel_capacity")]
    pub stream_channel_capacity: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5100".to_string()
}

fn default_max_poll_count() -> u32 {
    900
}

fn default_stable_rounds() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    180
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_request_timeout_seconds() -> u64 {
    45
}

fn default_stream_channel_capacity() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_poll_count: default_max_poll_count(),
            stable_rounds: default_stable_rounds(),
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            request_timeout_seconds: default_request_timeout_seconds(),
            stream_channel_capacity: default_stream_channel_capacity(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Thresholds shared by every profile.
    pub fn polling(&self) -> PollingConfig {
        PollingConfig::default()
            .with_max_poll_count(self.max_poll_count)
            .with_stable_rounds(self.stable_rounds)
            .with_timeout(Duration::from_secs(self.timeout_seconds))
    }

    pub fn image_polling(&self) -> PollingConfig {
        self.polling()
    }

    /// Videos render for minutes and the record appears late, so the
    /// first check is deferred.
    pub fn video_polling(&self) -> PollingConfig {
        self.polling()
            .with_timeout(VIDEO_TIMEOUT)
            .with_initial_delay(VIDEO_INITIAL_DELAY)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
