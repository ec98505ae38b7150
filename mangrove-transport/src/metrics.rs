// Attempt-level metrics aggregation. Pure accumulator; the transport never
// consults it, callers feed it through the attempt sink.

use crate::snapshot::AttemptRecord;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub total_attempts: u64,
    pub total_retries: u64,
    pub errors: u64,
    pub statuses: BTreeMap<String, u64>,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_max_ms: u64,
}

#[derive(Debug, Default)]
pub struct AttemptMetrics {
    durations_ms: Vec<u64>,
    retries: u64,
    errors: u64,
    statuses: BTreeMap<String, u64>,
}

impl AttemptMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: &AttemptRecord) {
        self.durations_ms.push(record.duration_ms);
        if record.will_retry {
            self.retries += 1;
        }
        let key = match record.status() {
            Some(code) => code.to_string(),
            None => {
                self.errors += 1;
                "ERR".to_string()
            }
        };
        *self.statuses.entry(key).or_insert(0) += 1;
    }

    pub fn summary(&self) -> AttemptSummary {
        let mut sorted = self.durations_ms.clone();
        sorted.sort_unstable();
        let pick = |quantile: f64| -> u64 {
            if sorted.is_empty() {
                return 0;
            }
            let index = ((quantile * (sorted.len() - 1) as f64).floor() as usize)
                .min(sorted.len() - 1);
            sorted[index]
        };
        AttemptSummary {
            total_attempts: self.durations_ms.len() as u64,
            total_retries: self.retries,
            errors: self.errors,
            statuses: self.statuses.clone(),
            latency_p50_ms: pick(0.5),
            latency_p95_ms: pick(0.95),
            latency_max_ms: sorted.last().copied().unwrap_or(0),
        }
    }
}
