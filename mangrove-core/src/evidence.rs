// Baseline-vs-probe differencing and tagging gates

use crate::finding::Tag;
use mangrove_transport::ResponseSnapshot;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Error signatures, operator names and cast/validation phrases whose
/// presence in a probe response suggests the payload reached a query engine.
pub const DEFAULT_KEYWORDS: [&str; 25] = [
    "MongoError",
    "E11000",
    "CastError",
    "validator failed",
    "Not authorized",
    "invalid operator",
    "ValidationError",
    "BSONTypeError",
    "MongoServerError",
    "MongoNetworkError",
    "UnhandledPromiseRejectionWarning",
    "TypeError:",
    "Cast to ObjectId failed",
    "CastError: Cast to ObjectId failed",
    "CastError: Cast to Number failed",
    "CastError: Cast to String failed",
    "duplicate key error collection",
    "E11000 duplicate key error",
    "ValidationError: Path",
    "required",
    "Path `",
    "is required",
    "$where",
    "$regex",
    "ObjectId(",
];

/// JSON fields searched, in order, for a list of returned items.
const ITEM_LIST_FIELDS: [&str; 3] = ["data", "items", "results"];

/// JSON fields searched, in order, for an updated-row count.
const UPDATED_COUNT_FIELDS: [&str; 5] = ["modifiedCount", "nModified", "updated", "updatedCount", "n"];

/// Derived, read-only comparison of one probe against the baseline.
/// All deltas are signed `current - baseline`.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub status_delta: i32,
    pub length_delta: i64,
    pub time_delta_ms: i64,
    pub keyword_hits: Vec<String>,
    pub count_delta: i64,
    pub updated_count: u64,
    pub base_status: u16,
    pub cur_status: u16,
    pub base_length: usize,
    pub cur_length: usize,
    pub base_time_ms: u64,
    pub cur_time_ms: u64,
    pub base_count: u64,
    pub cur_count: u64,
}

/// Gate values for tagging. Fixed constants in spirit, kept configurable so
/// embedding callers can tune the policy.
#[derive(Debug, Clone)]
pub struct Thresholds {
    /// |length delta| beyond which a response counts as anomalous.
    pub length_delta: i64,
    /// Item-count delta at which a probe is tagged as exfiltration.
    pub exfiltration_count: i64,
    /// Updated-row count at which a broadened filter is tagged manipulation.
    pub manipulation_count: u64,
    /// Time delta at which a probe is tagged as timing amplification.
    pub timing: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            length_delta: 50,
            exfiltration_count: 5,
            manipulation_count: 2,
            timing: Duration::from_millis(1000),
        }
    }
}

pub struct Analyzer {
    keywords: Vec<String>,
    pub thresholds: Thresholds,
}

impl Analyzer {
    pub fn new(keywords: Option<Vec<String>>, thresholds: Thresholds) -> Self {
        Self {
            keywords: keywords
                .unwrap_or_else(|| DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()),
            thresholds,
        }
    }

    /// Compute the full evidence block for one probe. Called once per probe;
    /// never accumulated across probes.
    pub fn diff(&self, baseline: &ResponseSnapshot, current: &ResponseSnapshot) -> Evidence {
        let base_count = item_count(&baseline.text);
        let cur_count = item_count(&current.text);
        Evidence {
            status_delta: i32::from(current.status) - i32::from(baseline.status),
            length_delta: current.length as i64 - baseline.length as i64,
            time_delta_ms: current.elapsed_ms() as i64 - baseline.elapsed_ms() as i64,
            keyword_hits: self
                .keywords
                .iter()
                .filter(|keyword| current.text.contains(keyword.as_str()))
                .cloned()
                .collect(),
            count_delta: cur_count as i64 - base_count as i64,
            updated_count: updated_count(&current.text),
            base_status: baseline.status,
            cur_status: current.status,
            base_length: baseline.length,
            cur_length: current.length,
            base_time_ms: baseline.elapsed_ms(),
            cur_time_ms: current.elapsed_ms(),
            base_count,
            cur_count,
        }
    }

    /// Tagging gate for the generic strategies. Timing-only and manipulation
    /// strategies apply their own single-tag gates instead.
    pub fn classify(&self, evidence: &Evidence) -> Vec<Tag> {
        let mut tags = Vec::new();
        if evidence.status_delta != 0
            || evidence.length_delta.abs() > self.thresholds.length_delta
            || !evidence.keyword_hits.is_empty()
        {
            tags.push(Tag::Anomaly);
        }
        if evidence.time_delta_ms >= self.thresholds.timing.as_millis() as i64 {
            tags.push(Tag::Timing);
        }
        if evidence.count_delta >= self.thresholds.exfiltration_count {
            tags.push(Tag::Exfiltration);
        }
        tags
    }
}

/// Structural item count of a response body: a JSON array's own length, else
/// the length of the first list-valued field among data/items/results, else
/// 0. Non-JSON bodies count as 0.
fn item_count(text: &str) -> u64 {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return 0;
    };
    match &value {
        Value::Array(items) => items.len() as u64,
        Value::Object(map) => ITEM_LIST_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_array))
            .map(|items| items.len() as u64)
            .unwrap_or(0),
        _ => 0,
    }
}

/// First finite non-negative value among the known updated-count fields.
/// Numeric strings count; anything else is skipped.
fn updated_count(text: &str) -> u64 {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) else {
        return 0;
    };
    for field in UPDATED_COUNT_FIELDS {
        let Some(value) = map.get(field) else {
            continue;
        };
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        };
        if let Some(n) = number
            && n.is_finite()
            && n >= 0.0
        {
            return n as u64;
        }
    }
    0
}
