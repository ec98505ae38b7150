use crate::evidence::Evidence;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category assigned to a probe whose evidence crossed a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    /// Status, length or keyword drift between baseline and probe.
    Anomaly,
    /// Response time amplification beyond the configured threshold.
    Timing,
    /// Probe returned materially more items than the baseline.
    Exfiltration,
    /// A broadened filter touched multiple records.
    Manipulation,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Anomaly => "anomaly",
            Tag::Timing => "timing",
            Tag::Exfiltration => "exfiltration",
            Tag::Manipulation => "manipulation",
        }
    }
}

/// One evidenced anomaly for one probe. Immutable; the unit strategies
/// return to callers.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub url: String,
    pub method: String,
    /// Injection point id: a query/body parameter name, a header name,
    /// `Cookie:<name>`, or `graphql:variables.<field>`.
    pub point: String,
    pub payload: Value,
    pub evidence: Evidence,
    pub tags: Vec<Tag>,
}
