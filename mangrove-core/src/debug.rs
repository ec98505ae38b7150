// Structured debug channel. Events flow to an optional injected sink and to
// the tracing subscriber; with no sink and the toggle off this is inert.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize)]
pub struct DebugEvent {
    pub ts_ms: u64,
    /// Event category: fetch, inject, evidence, crawler.
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Invoked synchronously on the scan path. Implementations must not block
/// and must not panic into the scanner.
pub type DebugSink = Arc<dyn Fn(&DebugEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct DebugLogger {
    enabled: bool,
    sink: Option<DebugSink>,
}

impl DebugLogger {
    pub fn new(enabled: bool, sink: Option<DebugSink>) -> Self {
        Self { enabled, sink }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn emit(&self, category: &str, message: impl Into<String>, data: Option<Value>) {
        if !self.enabled {
            return;
        }
        let event = DebugEvent {
            ts_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            category: category.to_string(),
            message: message.into(),
            data,
        };
        tracing::debug!(category = %event.category, "{}", event.message);
        if let Some(ref sink) = self.sink {
            sink(&event);
        }
    }
}
