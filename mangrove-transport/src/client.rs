// One logical request = one retry loop producing an ordered attempt trail.

use crate::error::{Result, TransportError};
use crate::proxy::ProxySettings;
use crate::retry::{FailureKind, RetryPolicy, backoff_delay, retry_reason};
use crate::snapshot::{AttemptOutcome, AttemptRecord, AttemptSink, ResponseSnapshot, unix_ms};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

pub struct TransportConfig {
    /// Per-attempt timeout, headers and body included.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub proxy: ProxySettings,
    pub user_agent: String,
    pub attempt_sink: Option<AttemptSink>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(8),
            retry: RetryPolicy::default(),
            proxy: ProxySettings::from_env(),
            user_agent: format!("mangrove/{}", env!("CARGO_PKG_VERSION")),
            attempt_sink: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

pub struct Transport {
    client: reqwest::Client,
    timeout: Duration,
    policy: RetryPolicy,
    attempt_sink: Option<AttemptSink>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let proxy = config.proxy.clone();
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .proxy(reqwest::Proxy::custom(move |url: &Url| proxy.resolve(url)))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(TransportError::ClientBuild)?;

        Ok(Self {
            client,
            timeout: config.timeout,
            policy: config.retry,
            attempt_sink: config.attempt_sink,
        })
    }

    /// Execute the request with the configured retry policy. I/O failures do
    /// not surface until retries exhaust, and any attempt that produced a
    /// status makes the final return carry that status; the error path is
    /// reached only when no attempt ever got one.
    pub async fn send(&self, request: &Request) -> Result<ResponseSnapshot> {
        let max_attempts = self.policy.effective_max_attempts();
        let call_start = Instant::now();
        let mut attempt_log: Vec<AttemptRecord> = Vec::new();
        let mut last_status: Option<(u16, HashMap<String, String>, String)> = None;
        let mut last_failure: Option<String> = None;

        for attempt in 1..=max_attempts {
            let started_at_ms = unix_ms();
            let attempt_start = Instant::now();
            let outcome = self.attempt(request).await;
            let duration = attempt_start.elapsed();

            match outcome {
                Ok((status, headers, text)) => {
                    let reason =
                        retry_reason(&self.policy, &request.method, Some(status), None);
                    let will_retry = reason.is_some() && attempt < max_attempts;
                    let delay = will_retry.then(|| backoff_delay(attempt, &self.policy));
                    self.push_record(
                        &mut attempt_log,
                        AttemptRecord {
                            url: request.url.to_string(),
                            method: request.method.to_string(),
                            attempt,
                            started_at_ms,
                            duration_ms: duration.as_millis() as u64,
                            outcome: AttemptOutcome::Status { code: status },
                            will_retry,
                            retry_delay_ms: delay.map(|d| d.as_millis() as u64),
                            reason,
                        },
                    );
                    last_status = Some((status, headers, text));
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    } else {
                        break;
                    }
                }
                Err(err) => {
                    let kind = FailureKind::classify(&err);
                    let reason = retry_reason(&self.policy, &request.method, None, Some(kind));
                    let will_retry = reason.is_some() && attempt < max_attempts;
                    let delay = will_retry.then(|| backoff_delay(attempt, &self.policy));
                    self.push_record(
                        &mut attempt_log,
                        AttemptRecord {
                            url: request.url.to_string(),
                            method: request.method.to_string(),
                            attempt,
                            started_at_ms,
                            duration_ms: duration.as_millis() as u64,
                            outcome: AttemptOutcome::Failed {
                                kind,
                                message: err.to_string(),
                            },
                            will_retry,
                            retry_delay_ms: delay.map(|d| d.as_millis() as u64),
                            reason,
                        },
                    );
                    last_failure = Some(err.to_string());
                    match delay {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => break,
                    }
                }
            }
        }

        if let Some((status, headers, text)) = last_status {
            return Ok(ResponseSnapshot {
                status,
                headers,
                length: text.len(),
                text,
                elapsed: call_start.elapsed(),
                attempts: attempt_log.len() as u32,
                attempt_log,
            });
        }

        Err(TransportError::Exhausted {
            url: request.url.to_string(),
            attempts: attempt_log.len() as u32,
            message: last_failure.unwrap_or_else(|| "no attempt was made".to_string()),
            attempt_log,
        })
    }

    async fn attempt(
        &self,
        request: &Request,
    ) -> std::result::Result<(u16, HashMap<String, String>, String), reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let mut headers = HashMap::with_capacity(response.headers().len());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
            }
        }
        let text = response.text().await?;
        Ok((status, headers, text))
    }

    fn push_record(&self, log: &mut Vec<AttemptRecord>, record: AttemptRecord) {
        debug!(
            url = %record.url,
            method = %record.method,
            attempt = record.attempt,
            will_retry = record.will_retry,
            "http attempt"
        );
        if let Some(ref sink) = self.attempt_sink {
            sink(&record);
        }
        log.push(record);
    }
}
