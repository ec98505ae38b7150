// Differential scan strategies. Every strategy follows the same contract:
// one baseline fetch, then one probe fetch per (injection point, payload)
// pair, each diffed against the baseline — never against a prior probe —
// with a configurable pause between probes. Fetches are strictly
// sequential; a scanner instance never overlaps two requests.

use crate::config::ScannerConfig;
use crate::debug::DebugLogger;
use crate::error::{Result, parse_url};
use crate::evidence::Analyzer;
use crate::finding::{Finding, Tag};
use crate::payloads::{
    MANIPULATION_TEMPLATES, TIMING_STRING_PAYLOADS, TIMING_TEMPLATES, TargetFamily,
    body_templates, string_payloads,
};
use mangrove_transport::{
    Method, ProxySettings, Request, ResponseSnapshot, Transport, TransportConfig,
};
use serde_json::{Value, json};
use url::Url;

/// Header names probed when the caller does not pick their own.
pub const DEFAULT_SCAN_HEADERS: [&str; 3] = ["X-Filter", "X-Query", "X-Search"];

/// Cookie names probed when the caller does not pick their own.
pub const DEFAULT_SCAN_COOKIES: [&str; 3] = ["session", "filter", "query"];

pub struct Scanner {
    transport: Transport,
    analyzer: Analyzer,
    pub(crate) logger: DebugLogger,
    family: TargetFamily,
    delay: std::time::Duration,
    default_headers: Vec<(String, String)>,
}

impl Scanner {
    pub fn new(config: ScannerConfig) -> Result<Self> {
        let transport = Transport::new(TransportConfig {
            timeout: config.timeout,
            retry: config.retry.clone(),
            proxy: ProxySettings::from_env().with_override(config.proxy.clone()),
            user_agent: config.user_agent.clone(),
            attempt_sink: config.attempt_sink.clone(),
        })
        .map_err(crate::error::ScanError::Transport)?;

        Ok(Self {
            transport,
            analyzer: Analyzer::new(config.keywords.clone(), config.thresholds.clone()),
            logger: DebugLogger::new(config.debug, config.debug_sink.clone()),
            family: config.family,
            delay: config.delay,
            default_headers: config.default_headers,
        })
    }

    pub fn family(&self) -> TargetFamily {
        self.family
    }

    /// Probe the query string: every payload of the family substituted into
    /// every named parameter.
    pub async fn scan_get(&self, url: &str, params: &[String]) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let baseline = self.fetch(Request::get(target.clone())).await?;
        self.logger.emit(
            "inject",
            format!("GET baseline {target}"),
            Some(json!({ "status": baseline.status, "length": baseline.length })),
        );

        let mut findings = Vec::new();
        for param in params {
            for payload in string_payloads(self.family) {
                let probe_url = with_query_param(&target, param, payload);
                let current = self.fetch(Request::get(probe_url.clone())).await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                let tags = self.analyzer.classify(&evidence);
                self.logger.emit(
                    "evidence",
                    format!("GET param={param}"),
                    Some(json!({ "payload": payload, "tags": &tags })),
                );
                if !tags.is_empty() {
                    findings.push(Finding {
                        url: probe_url.to_string(),
                        method: Method::GET.to_string(),
                        point: param.clone(),
                        payload: json!(payload),
                        evidence,
                        tags,
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Probe a JSON body: every template applied to every named field,
    /// shallow-merged over the caller's base body.
    pub async fn scan_body(
        &self,
        url: &str,
        method: Method,
        base_body: &Value,
        fields: &[String],
    ) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let baseline = self
            .fetch(Request::new(method.clone(), target.clone()).with_json(base_body.clone()))
            .await?;

        let mut findings = Vec::new();
        for field in fields {
            for template in body_templates(self.family) {
                let original = field_value(base_body, field);
                let probe_body = merge_shallow(base_body, template(field, &original));
                let current = self
                    .fetch(Request::new(method.clone(), target.clone()).with_json(probe_body.clone()))
                    .await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                let tags = self.analyzer.classify(&evidence);
                if !tags.is_empty() {
                    findings.push(Finding {
                        url: target.to_string(),
                        method: method.to_string(),
                        point: field.clone(),
                        payload: field_value(&probe_body, field),
                        evidence,
                        tags,
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Probe request headers with the family's string payloads.
    pub async fn scan_headers(&self, url: &str, header_names: &[String]) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let names = fallback_names(header_names, &DEFAULT_SCAN_HEADERS);
        let baseline = self.fetch(Request::get(target.clone())).await?;

        let mut findings = Vec::new();
        for name in &names {
            for payload in string_payloads(self.family) {
                let current = self
                    .fetch(Request::get(target.clone()).with_header(name.clone(), *payload))
                    .await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                let tags = self.analyzer.classify(&evidence);
                if !tags.is_empty() {
                    findings.push(Finding {
                        url: target.to_string(),
                        method: Method::GET.to_string(),
                        point: name.clone(),
                        payload: json!(payload),
                        evidence,
                        tags,
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Probe cookie values through the Cookie header.
    pub async fn scan_cookies(&self, url: &str, cookie_names: &[String]) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let names = fallback_names(cookie_names, &DEFAULT_SCAN_COOKIES);
        let baseline = self.fetch(Request::get(target.clone())).await?;

        let mut findings = Vec::new();
        for name in &names {
            for payload in string_payloads(self.family) {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(payload.as_bytes()).collect();
                let cookie = format!("{name}={encoded}");
                let current = self
                    .fetch(Request::get(target.clone()).with_header("Cookie", cookie))
                    .await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                let tags = self.analyzer.classify(&evidence);
                if !tags.is_empty() {
                    findings.push(Finding {
                        url: target.to_string(),
                        method: Method::GET.to_string(),
                        point: format!("Cookie:{name}"),
                        payload: json!(payload),
                        evidence,
                        tags,
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Probe GraphQL variables: the query text stays untouched, each
    /// template output becomes the variables object.
    pub async fn scan_graphql(
        &self,
        url: &str,
        operation_name: Option<&str>,
        query: &str,
        variable_fields: &[String],
    ) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let baseline = self
            .fetch(Request::new(Method::POST, target.clone()).with_json(json!({
                "operationName": operation_name,
                "query": query,
                "variables": {},
            })))
            .await?;

        let mut findings = Vec::new();
        for field in variable_fields {
            for template in body_templates(self.family) {
                let variables = template(field, &Value::String(String::new()));
                let current = self
                    .fetch(Request::new(Method::POST, target.clone()).with_json(json!({
                        "operationName": operation_name,
                        "query": query,
                        "variables": variables,
                    })))
                    .await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                let tags = self.analyzer.classify(&evidence);
                if !tags.is_empty() {
                    findings.push(Finding {
                        url: target.to_string(),
                        method: Method::POST.to_string(),
                        point: format!("graphql:variables.{field}"),
                        payload: field_value(&variables, field),
                        evidence,
                        tags,
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Timing probes over the query string. Gates solely on the time delta.
    pub async fn scan_dos_get(&self, url: &str, params: &[String]) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let baseline = self.fetch(Request::get(target.clone())).await?;

        let mut findings = Vec::new();
        for param in params {
            for payload in TIMING_STRING_PAYLOADS {
                let probe_url = with_query_param(&target, param, payload);
                let current = self.fetch(Request::get(probe_url.clone())).await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                if evidence.time_delta_ms >= self.analyzer.thresholds.timing.as_millis() as i64 {
                    findings.push(Finding {
                        url: probe_url.to_string(),
                        method: Method::GET.to_string(),
                        point: param.clone(),
                        payload: json!(payload),
                        evidence,
                        tags: vec![Tag::Timing],
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Timing probes over a JSON body. Gates solely on the time delta.
    pub async fn scan_dos_body(
        &self,
        url: &str,
        method: Method,
        base_body: &Value,
        fields: &[String],
    ) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let baseline = self
            .fetch(Request::new(method.clone(), target.clone()).with_json(base_body.clone()))
            .await?;

        let mut findings = Vec::new();
        for field in fields {
            for template in TIMING_TEMPLATES {
                let original = field_value(base_body, field);
                let probe_body = merge_shallow(base_body, template(field, &original));
                let current = self
                    .fetch(Request::new(method.clone(), target.clone()).with_json(probe_body.clone()))
                    .await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                if evidence.time_delta_ms >= self.analyzer.thresholds.timing.as_millis() as i64 {
                    findings.push(Finding {
                        url: target.to_string(),
                        method: method.to_string(),
                        point: field.clone(),
                        payload: field_value(&probe_body, field),
                        evidence,
                        tags: vec![Tag::Timing],
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Broadening-filter probes judged by the reported updated-row count
    /// alone; response drift is deliberately ignored here.
    pub async fn scan_manipulation(
        &self,
        url: &str,
        method: Method,
        base_body: &Value,
        filter_fields: &[String],
    ) -> Result<Vec<Finding>> {
        let target = parse_url(url)?;
        let baseline = self
            .fetch(Request::new(method.clone(), target.clone()).with_json(base_body.clone()))
            .await?;

        let mut findings = Vec::new();
        for field in filter_fields {
            for template in MANIPULATION_TEMPLATES {
                let original = field_value(base_body, field);
                let probe_body = merge_shallow(base_body, template(field, &original));
                let current = self
                    .fetch(Request::new(method.clone(), target.clone()).with_json(probe_body.clone()))
                    .await?;
                let evidence = self.analyzer.diff(&baseline, &current);
                if evidence.updated_count >= self.analyzer.thresholds.manipulation_count {
                    findings.push(Finding {
                        url: target.to_string(),
                        method: method.to_string(),
                        point: field.clone(),
                        payload: field_value(&probe_body, field),
                        evidence,
                        tags: vec![Tag::Manipulation],
                    });
                }
                self.pause().await;
            }
        }
        Ok(findings)
    }

    /// Issue one request through the transport with the scanner's default
    /// headers applied underneath the per-call ones.
    pub(crate) async fn fetch(&self, request: Request) -> Result<ResponseSnapshot> {
        let Request {
            url,
            method,
            headers,
            body,
        } = request;
        let mut merged: Vec<(String, String)> = self.default_headers.clone();
        for (name, value) in headers {
            merged.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
            merged.push((name, value));
        }
        let request = Request {
            url,
            method,
            headers: merged,
            body,
        };
        let snapshot = self.transport.send(&request).await?;
        self.logger.emit(
            "fetch",
            format!("{} {}", request.method, request.url),
            Some(json!({ "status": snapshot.status, "attempts": snapshot.attempts })),
        );
        Ok(snapshot)
    }

    pub(crate) async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Set (replace or append) one query parameter, leaving the rest intact.
fn with_query_param(url: &Url, name: &str, value: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut out = url.clone();
    {
        let mut editor = out.query_pairs_mut();
        editor.clear();
        let mut replaced = false;
        for (key, existing) in &pairs {
            if key == name {
                editor.append_pair(key, value);
                replaced = true;
            } else {
                editor.append_pair(key, existing);
            }
        }
        if !replaced {
            editor.append_pair(name, value);
        }
    }
    out
}

/// Shallow merge: overlay entries replace base entries of the same name.
/// A non-object overlay (or base) resolves to the overlay itself.
fn merge_shallow(base: &Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay,
    }
}

fn field_value(body: &Value, field: &str) -> Value {
    body.as_object()
        .and_then(|map| map.get(field))
        .cloned()
        .unwrap_or(Value::Null)
}

fn fallback_names(given: &[String], defaults: &[&str]) -> Vec<String> {
    if given.is_empty() {
        defaults.iter().map(|name| name.to_string()).collect()
    } else {
        given.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_query_param_replaces_existing_values() {
        let url = Url::parse("http://t.example/search?q=hello&page=2").unwrap();
        let out = with_query_param(&url, "q", "probe");
        let pairs: Vec<(String, String)> = out
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("q".to_string(), "probe".to_string())));
        assert!(pairs.contains(&("page".to_string(), "2".to_string())));
    }

    #[test]
    fn with_query_param_appends_missing_parameters() {
        let url = Url::parse("http://t.example/item").unwrap();
        let out = with_query_param(&url, "id", "1");
        assert_eq!(out.query(), Some("id=1"));
    }

    #[test]
    fn merge_shallow_overlays_fields() {
        let base = json!({ "user": "alice", "role": "viewer" });
        let merged = merge_shallow(&base, json!({ "user": { "$ne": "" } }));
        assert_eq!(merged["user"], json!({ "$ne": "" }));
        assert_eq!(merged["role"], json!("viewer"));
    }

    #[test]
    fn merge_shallow_keeps_top_level_operators() {
        let base = json!({ "user": "alice" });
        let merged = merge_shallow(&base, json!({ "$or": [1, 2] }));
        assert_eq!(merged["user"], json!("alice"));
        assert_eq!(merged["$or"], json!([1, 2]));
    }

    #[test]
    fn fallback_names_kick_in_only_when_empty() {
        let picked = fallback_names(&[], &DEFAULT_SCAN_HEADERS);
        assert_eq!(picked.len(), 3);
        let given = vec!["X-Own".to_string()];
        assert_eq!(fallback_names(&given, &DEFAULT_SCAN_HEADERS), given);
    }
}
