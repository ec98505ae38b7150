use crate::debug::DebugSink;
use crate::evidence::Thresholds;
use crate::payloads::TargetFamily;
use mangrove_transport::{AttemptSink, RetryPolicy};
use std::time::Duration;
use url::Url;

/// Construction-time configuration for a scanner instance. Everything is
/// fixed once the scanner exists; per-call knobs live on the strategy
/// arguments instead.
#[derive(Clone)]
pub struct ScannerConfig {
    /// Per-attempt timeout handed to the transport.
    pub timeout: Duration,
    /// Pause between probe fetches; the natural rate limit of a scan.
    pub delay: Duration,
    /// Override of the built-in keyword list; None keeps the default.
    pub keywords: Option<Vec<String>>,
    /// Headers added to every request; per-call headers win on conflict.
    pub default_headers: Vec<(String, String)>,
    pub thresholds: Thresholds,
    pub family: TargetFamily,
    pub retry: RetryPolicy,
    /// Explicit proxy override; environment proxies apply when None.
    pub proxy: Option<Url>,
    pub user_agent: String,
    pub debug: bool,
    pub attempt_sink: Option<AttemptSink>,
    pub debug_sink: Option<DebugSink>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerConfig {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            delay: Duration::from_millis(50),
            keywords: None,
            default_headers: Vec::new(),
            thresholds: Thresholds::default(),
            family: TargetFamily::default(),
            retry: RetryPolicy::default(),
            proxy: None,
            user_agent: format!("mangrove/{}", env!("CARGO_PKG_VERSION")),
            debug: false,
            attempt_sink: None,
            debug_sink: None,
        }
    }

    pub fn with_family(mut self, family: TargetFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timing_threshold(mut self, threshold: Duration) -> Self {
        self.thresholds.timing = threshold;
        self
    }
}
