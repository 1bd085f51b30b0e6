//! Vendor error classification.
//!
//! Every failure, whether a rejection envelope from the vendor or a broken
//! HTTP exchange, is folded into the closed [`ErrorKind`] taxonomy. The kind
//! decides two things: the HTTP status surfaced to the caller and whether the
//! failed operation may be retried.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::models::job::{JobKind, VendorStatus};

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    ParamsInvalid,
    TokenExpired,
    ContentFiltered,
    InsufficientCredit,
    GenerationFailed,
    RateLimited,
    ServerError,
    Timeout,
    /// A vendor code absent from the lookup table.
    RequestFailed,
    Unknown,
}

impl ErrorKind {
    /// HTTP status hint for this kind. `ServerError` passes the upstream status
    /// through instead, see [`classify_transport_error`].
    pub fn default_http_status(self) -> u16 {
        match self {
            Self::ParamsInvalid | Self::ContentFiltered => 400,
            Self::TokenExpired => 401,
            Self::RateLimited | Self::GenerationFailed | Self::InsufficientCredit => 429,
            Self::ServerError => 502,
            Self::Timeout => 504,
            Self::RequestFailed | Self::Unknown => 429,
        }
    }

    /// Definitive business-logic rejections that must never be retried.
    pub fn is_business_rejection(self) -> bool {
        matches!(
            self,
            Self::ParamsInvalid | Self::TokenExpired | Self::ContentFiltered | Self::InsufficientCredit
        )
    }
}

/// A classified failure. Immutable once built and passed around by value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("[{kind}] {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub http_status: u16,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: kind.default_http_status(),
        }
    }

    pub fn params_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParamsInvalid, message)
    }

    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GenerationFailed, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, message)
    }

    /// The caller abandoned the job between two status checks.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Unknown, "job abandoned by caller before completion")
    }

    fn with_status(mut self, http_status: u16) -> Self {
        self.http_status = http_status;
        self
    }
}

/// Failures below the vendor's business layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {url}")]
    Status { status: u16, url: String, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed vendor response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                body: String::new(),
            };
        }
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Outcome of a single vendor exchange that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The vendor answered with a rejection envelope; already classified.
    #[error(transparent)]
    Rejected(#[from] ApiError),
}

impl RequestError {
    pub fn classify(self) -> ApiError {
        match self {
            Self::Transport(err) => classify_transport_error(&err),
            Self::Rejected(err) => err,
        }
    }
}

/// Vendor `ret` codes. Lookup is by exact code, so row order is irrelevant.
const VENDOR_CODES: &[(&str, ErrorKind, &str)] = &[
    ("1015", ErrorKind::TokenExpired, "session expired, refresh the token"),
    ("4001", ErrorKind::ContentFiltered, "content rejected by moderation"),
    ("4002", ErrorKind::ParamsInvalid, "invalid request parameters"),
    ("5000", ErrorKind::InsufficientCredit, "insufficient credit"),
    ("5001", ErrorKind::GenerationFailed, "image generation failed"),
    ("5002", ErrorKind::GenerationFailed, "video generation failed"),
];

fn lookup_vendor_code(code: &str) -> Option<(ErrorKind, &'static str)> {
    VENDOR_CODES
        .iter()
        .find(|(known, _, _)| *known == code)
        .map(|(_, kind, label)| (*kind, *label))
}

/// Map a vendor rejection (`ret`, `errmsg`) to a classification.
///
/// Unknown codes are never dropped: they become `RequestFailed` carrying the raw
/// code and message.
pub fn classify_vendor_error(code: &str, message: &str) -> ApiError {
    match lookup_vendor_code(code) {
        Some((kind, label)) => ApiError::new(kind, format!("{label}: {message}")),
        None => ApiError::new(
            ErrorKind::RequestFailed,
            format!("vendor request failed: {message} (code {code})"),
        ),
    }
}

pub fn classify_transport_error(err: &TransportError) -> ApiError {
    if let TransportError::Status { status, body, .. } = err {
        tracing::debug!(status, body = %body, "Vendor returned HTTP error");
    }
    match err {
        TransportError::Timeout => ApiError::new(ErrorKind::Timeout, "vendor request timed out"),
        TransportError::Status { status: 429, .. } => {
            ApiError::new(ErrorKind::RateLimited, "vendor rate limit reached, retry later")
        }
        TransportError::Status { status, .. } if *status >= 500 => ApiError::new(
            ErrorKind::ServerError,
            format!("vendor temporarily unavailable (HTTP {status})"),
        )
        .with_status(*status),
        TransportError::Status { status, url, .. } => ApiError::new(
            ErrorKind::ParamsInvalid,
            format!("vendor rejected request to {url} (HTTP {status})"),
        ),
        TransportError::Network(detail) => {
            ApiError::new(ErrorKind::RequestFailed, format!("network error: {detail}"))
        }
        TransportError::Decode(detail) => {
            ApiError::new(ErrorKind::Unknown, format!("malformed vendor response: {detail}"))
        }
    }
}

/// Terminal error for a job the vendor reported as FAILED.
///
/// A `fail_code` that matches the vendor table keeps that classification, so a
/// moderation failure still surfaces as `ContentFiltered`.
pub fn classify_generation_failure(
    kind: JobKind,
    status: VendorStatus,
    fail_code: Option<&str>,
) -> ApiError {
    let detail = match fail_code {
        Some(code) => format!("{kind} generation failed, status {}, fail code {code}", status.code()),
        None => format!("{kind} generation failed, status {}", status.code()),
    };
    match fail_code.and_then(lookup_vendor_code) {
        Some((mapped, label)) => ApiError::new(mapped, format!("{label}: {detail}")),
        None => ApiError::generation_failed(detail),
    }
}

pub fn is_retryable(error: &ApiError) -> bool {
    !error.kind.is_business_rejection() && error.kind != ErrorKind::GenerationFailed
}

/// Fixed-count, fixed-delay retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_retries + 1,
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(5))
    }
}

/// Run `operation` under `policy`.
///
/// Non-retryable classifications return on first occurrence. Exhausting the
/// budget turns the last error into a terminal classification.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    context: &str,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err.classify(),
        };

        if !is_retryable(&error) {
            tracing::error!(context, kind = %error.kind, error = %error.message, "Vendor rejected request");
            return Err(error);
        }

        if attempt >= attempts {
            tracing::error!(context, attempts, error = %error.message, "Retry budget exhausted");
            let message = format!("{} (after {attempts} attempts)", error.message);
            return Err(ApiError { message, ..error });
        }

        tracing::warn!(
            context,
            attempt,
            max_attempts = attempts,
            delay_ms = policy.delay.as_millis() as u64,
            error = %error.message,
            "Vendor request failed, retrying"
        );
        tokio::time::sleep(policy.delay).await;
    }
}
