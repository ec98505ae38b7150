use crate::retry::FailureKind;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What a single network try produced: a status line, or a classified
/// failure. Exactly one of the two.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Status { code: u16 },
    Failed { kind: FailureKind, message: String },
}

/// One entry of a call's attempt trail. Append-only; the transport never
/// rewrites records once reported.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub url: String,
    pub method: String,
    /// 1-based attempt index within the logical call.
    pub attempt: u32,
    pub started_at_ms: u64,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub will_retry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AttemptRecord {
    pub fn status(&self) -> Option<u16> {
        match self.outcome {
            AttemptOutcome::Status { code } => Some(code),
            AttemptOutcome::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match self.outcome {
            AttemptOutcome::Failed { kind, .. } => Some(kind),
            AttemptOutcome::Status { .. } => None,
        }
    }
}

/// Attempt observer. Invoked synchronously on the request path, in attempt
/// order, before the retry sleep or the final return. Implementations must
/// not block and must not panic into the transport.
pub type AttemptSink = Arc<dyn Fn(&AttemptRecord) + Send + Sync>;

/// The materialized outcome of one logical request.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: u16,
    /// Header names lowercased; duplicate headers keep the last value.
    pub headers: HashMap<String, String>,
    pub text: String,
    pub length: usize,
    /// Wall time of the whole call, retries and backoff included.
    pub elapsed: Duration,
    pub attempts: u32,
    pub attempt_log: Vec<AttemptRecord>,
}

impl ResponseSnapshot {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }
}

pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
