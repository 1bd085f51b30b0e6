use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// What a remote generation job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    Image,
    Video,
}

/// One remote generation request, identified by the id the vendor issued on submission.
///
/// A job maps to exactly one polling session and is never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    /// Session token the job was submitted with; status checks must use the same account.
    pub credential: String,
    /// Reaching this many items is a success exit independent of the status code.
    pub expected_item_count: Option<u32>,
}

impl Job {
    pub fn new(id: impl Into<String>, kind: JobKind, credential: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            credential: credential.into(),
            expected_item_count: None,
        }
    }

    pub fn expecting(mut self, count: u32) -> Self {
        self.expected_item_count = (count > 0).then_some(count);
        self
    }
}

/// Everything the remote client needs to create a job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub kind: JobKind,
    pub credential: String,
    /// Vendor request body, already shaped by the draft builder.
    pub payload: serde_json::Value,
}

/// Vendor status vocabulary reported by `get_history_by_ids`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorStatus {
    Processing,
    Success,
    Failed,
    PostProcessing,
    Finalizing,
    Completed,
    Unrecognized(i64),
}

impl VendorStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            20 => Self::Processing,
            10 => Self::Success,
            30 => Self::Failed,
            42 => Self::PostProcessing,
            45 => Self::Finalizing,
            50 => Self::Completed,
            other => Self::Unrecognized(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Processing => 20,
            Self::Success => 10,
            Self::Failed => 30,
            Self::PostProcessing => 42,
            Self::Finalizing => 45,
            Self::Completed => 50,
            Self::Unrecognized(code) => code,
        }
    }

    /// SUCCESS or COMPLETED.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Completed)
    }

    /// POST_PROCESSING or FINALIZING: the vendor is wrapping up.
    pub fn is_near_completion(self) -> bool {
        matches!(self, Self::PostProcessing | Self::Finalizing)
    }
}

impl std::fmt::Display for VendorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => f.write_str("PROCESSING"),
            Self::Success => f.write_str("SUCCESS"),
            Self::Failed => f.write_str("FAILED"),
            Self::PostProcessing => f.write_str("POST_PROCESSING"),
            Self::Finalizing => f.write_str("FINALIZING"),
            Self::Completed => f.write_str("COMPLETED"),
            Self::Unrecognized(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Normalized snapshot returned by one status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub status: VendorStatus,
    /// Only meaningful when `status` is `Failed`.
    pub fail_code: Option<String>,
    /// Result items currently visible; may be partial while processing.
    pub item_count: u32,
    pub finish_time: Option<i64>,
}

impl RemoteStatus {
    pub fn new(status: VendorStatus, item_count: u32) -> Self {
        Self {
            status,
            fail_code: None,
            item_count,
            finish_time: None,
        }
    }

    pub fn with_fail_code(mut self, fail_code: impl Into<String>) -> Self {
        self.fail_code = Some(fail_code.into());
        self
    }
}

/// One status check: the normalized snapshot plus the raw vendor record it came from.
#[derive(Debug, Clone)]
pub struct StatusCheck {
    pub status: RemoteStatus,
    pub record: serde_json::Value,
}
