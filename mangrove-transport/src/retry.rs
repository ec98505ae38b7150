// Retry eligibility and full-jitter exponential backoff

use rand::Rng;
use reqwest::Method;
use serde::Serialize;
use std::error::Error as _;
use std::time::Duration;

/// Status codes that indicate a transient upstream condition.
pub const RETRY_STATUS: [u16; 3] = [502, 503, 504];

/// Retry behavior for one logical request. Immutable once handed to the
/// transport; callers construct a fresh policy to change behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub delay_cap: Duration,
    /// Allow retrying POST/PUT/PATCH/DELETE. Off by default: replaying a
    /// non-idempotent request can double-apply a mutation.
    pub retry_unsafe_methods: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(200),
            delay_cap: Duration::from_millis(2000),
            retry_unsafe_methods: false,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_delay_cap(mut self, delay_cap: Duration) -> Self {
        self.delay_cap = delay_cap;
        self
    }

    pub fn with_unsafe_retries(mut self, allowed: bool) -> Self {
        self.retry_unsafe_methods = allowed;
        self
    }

    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Classification of a failed attempt, used for retry decisions and carried
/// in the attempt trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ConnectionReset,
    DnsFailure,
    Connect,
    Other,
}

impl FailureKind {
    pub fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return FailureKind::Timeout;
        }
        let mut cause: Option<&(dyn std::error::Error + 'static)> = err.source();
        while let Some(inner) = cause {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                match io.kind() {
                    std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe => return FailureKind::ConnectionReset,
                    std::io::ErrorKind::TimedOut => return FailureKind::Timeout,
                    _ => {}
                }
            }
            let text = inner.to_string();
            if text.contains("dns error") || text.contains("failed to lookup address") {
                return FailureKind::DnsFailure;
            }
            cause = inner.source();
        }
        if err.is_connect() {
            FailureKind::Connect
        } else {
            FailureKind::Other
        }
    }

    /// Connection refused is deliberately not transient: a listener that is
    /// not there will not appear between attempts of the same scan.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::ConnectionReset | FailureKind::DnsFailure
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionReset => "connection_reset",
            FailureKind::DnsFailure => "dns_failure",
            FailureKind::Connect => "connect",
            FailureKind::Other => "other",
        }
    }
}

pub fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

/// Decide whether an attempt outcome is eligible for a retry. Returns the
/// textual reason when it is, None otherwise. Eligibility does not consider
/// how many attempts remain; the caller owns that.
pub fn retry_reason(
    policy: &RetryPolicy,
    method: &Method,
    status: Option<u16>,
    failure: Option<FailureKind>,
) -> Option<String> {
    if !policy.retry_unsafe_methods && !is_safe_method(method) {
        return None;
    }
    if let Some(code) = status
        && RETRY_STATUS.contains(&code)
    {
        return Some(format!("status:{code}"));
    }
    if let Some(kind) = failure
        && kind.is_transient()
    {
        return Some(format!("error:{}", kind.as_str()));
    }
    None
}

/// Delay before retry `k` (k = 1 for the first retry): drawn uniformly from
/// [0, min(cap, base * 2^(k-1))], the AWS full-jitter scheme. A fresh draw
/// every call.
pub fn backoff_delay(retry: u32, policy: &RetryPolicy) -> Duration {
    let exponent = retry.saturating_sub(1).min(31);
    let raw = policy.base_delay.as_millis() as f64 * f64::from(2u32.pow(exponent));
    let capped = raw.min(policy.delay_cap.as_millis() as f64);
    let jittered = rand::rng().random_range(0.0..=capped.max(0.0));
    Duration::from_millis(jittered as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, unsafe_retries: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            delay_cap: Duration::from_millis(1500),
            retry_unsafe_methods: unsafe_retries,
        }
    }

    #[test]
    fn backoff_stays_within_envelope() {
        let policy = policy(5, false);
        for retry in 1..=6u32 {
            let ceiling = (100f64 * f64::from(2u32.pow(retry - 1))).min(1500.0) as u64;
            for _ in 0..50 {
                let delay = backoff_delay(retry, &policy);
                assert!(
                    delay <= Duration::from_millis(ceiling),
                    "retry {retry}: {delay:?} above {ceiling}ms"
                );
            }
        }
    }

    #[test]
    fn backoff_caps_at_delay_cap() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(500))
            .with_delay_cap(Duration::from_millis(800));
        for _ in 0..50 {
            assert!(backoff_delay(10, &policy) <= Duration::from_millis(800));
        }
    }

    #[test]
    fn safe_methods_retry_on_gateway_status() {
        let policy = policy(3, false);
        for code in RETRY_STATUS {
            assert!(retry_reason(&policy, &Method::GET, Some(code), None).is_some());
            assert!(retry_reason(&policy, &Method::HEAD, Some(code), None).is_some());
        }
        assert_eq!(
            retry_reason(&policy, &Method::GET, Some(503), None).as_deref(),
            Some("status:503")
        );
    }

    #[test]
    fn non_retryable_statuses_end_the_call() {
        let policy = policy(3, false);
        for code in [200, 301, 404, 429, 500] {
            assert!(retry_reason(&policy, &Method::GET, Some(code), None).is_none());
        }
    }

    #[test]
    fn unsafe_methods_do_not_retry_by_default() {
        let policy = policy(3, false);
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert!(retry_reason(&policy, &method, Some(503), None).is_none());
            assert!(
                retry_reason(&policy, &method, None, Some(FailureKind::Timeout)).is_none()
            );
        }
    }

    #[test]
    fn unsafe_methods_retry_when_allowed() {
        let policy = policy(3, true);
        assert!(retry_reason(&policy, &Method::POST, Some(502), None).is_some());
        assert!(
            retry_reason(&policy, &Method::DELETE, None, Some(FailureKind::ConnectionReset))
                .is_some()
        );
    }

    #[test]
    fn transient_failure_kinds() {
        assert!(FailureKind::Timeout.is_transient());
        assert!(FailureKind::ConnectionReset.is_transient());
        assert!(FailureKind::DnsFailure.is_transient());
        assert!(!FailureKind::Connect.is_transient());
        assert!(!FailureKind::Other.is_transient());

        let policy = policy(3, false);
        assert_eq!(
            retry_reason(&policy, &Method::GET, None, Some(FailureKind::DnsFailure)).as_deref(),
            Some("error:dns_failure")
        );
        assert!(retry_reason(&policy, &Method::GET, None, Some(FailureKind::Connect)).is_none());
    }
}
