// Report generation from scan findings

use crate::evidence::Evidence;
use crate::finding::{Finding, Tag};
use crate::payloads::TargetFamily;
use chrono::{Datelike, Utc};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEndpoint {
    pub method: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

/// Baseline/probe value pairs, present only where the pair differs enough to
/// matter for a reader.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvidenceDiff {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<(u16, u16)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<(usize, usize)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ms: Option<(u64, u64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<(u64, u64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub family: String,
    pub endpoint: ReportEndpoint,
    pub payload: Value,
    pub evidence: EvidenceDiff,
    pub remediation: Vec<String>,
    pub confidence: f64,
}

pub fn build_report(findings: &[Finding], family: TargetFamily) -> Vec<ReportEntry> {
    let year = Utc::now().year();
    findings
        .iter()
        .enumerate()
        .map(|(index, finding)| ReportEntry {
            id: format!("NOSQLI-{year}-{:04}", index + 1),
            title: format!("{family} selector injection"),
            severity: severity_of(finding),
            family: family.as_str().to_string(),
            endpoint: ReportEndpoint {
                method: finding.method.clone(),
                url: finding.url.clone(),
                parameter: Some(finding.point.clone()),
            },
            payload: finding.payload.clone(),
            evidence: diff_of(&finding.evidence),
            remediation: remediation_for(family),
            confidence: confidence_of(finding),
        })
        .collect()
}

fn severity_of(finding: &Finding) -> Severity {
    if finding.tags.contains(&Tag::Timing) || finding.tags.contains(&Tag::Exfiltration) {
        Severity::High
    } else if finding.tags.contains(&Tag::Anomaly) {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn diff_of(evidence: &Evidence) -> EvidenceDiff {
    EvidenceDiff {
        status: Some((evidence.base_status, evidence.cur_status)),
        length: Some((evidence.base_length, evidence.cur_length)),
        time_ms: Some((evidence.base_time_ms, evidence.cur_time_ms)),
        count: Some((evidence.base_count, evidence.cur_count)),
        keywords: if evidence.keyword_hits.is_empty() {
            None
        } else {
            Some(evidence.keyword_hits.clone())
        },
    }
}

fn confidence_of(finding: &Finding) -> f64 {
    let evidence = &finding.evidence;
    let mut confidence: f64 = 0.3;
    if !evidence.keyword_hits.is_empty() {
        confidence += 0.3;
    }
    if evidence.status_delta != 0 || evidence.length_delta.abs() > 50 {
        confidence += 0.2;
    }
    if evidence.time_delta_ms > 0 {
        confidence += 0.1;
    }
    if evidence.count_delta >= 5 || evidence.updated_count >= 2 {
        confidence += 0.1;
    }
    (confidence.min(1.0) * 100.0).round() / 100.0
}

fn remediation_for(family: TargetFamily) -> Vec<String> {
    let mut steps = vec![
        "Strict validation".to_string(),
        "Parameterized filters".to_string(),
    ];
    match family {
        TargetFamily::MongoDb => {}
        TargetFamily::Elasticsearch => {
            steps.push("Disable dangerous scripts/Painless".to_string());
        }
        TargetFamily::CouchDb => {
            steps.push("Restrict Mango selectors and map/reduce inputs".to_string());
        }
    }
    steps
}

/// Plain text rendering for terminal output.
pub fn render_text(entries: &[ReportEntry]) -> String {
    let mut out = String::new();
    out.push_str("\n═══════════════════════════════════════════════════════════════════\n");
    out.push_str("                         SCAN FINDINGS\n");
    out.push_str("═══════════════════════════════════════════════════════════════════\n\n");

    let high = entries.iter().filter(|e| e.severity == Severity::High).count();
    let medium = entries
        .iter()
        .filter(|e| e.severity == Severity::Medium)
        .count();
    let low = entries.iter().filter(|e| e.severity == Severity::Low).count();
    out.push_str(&format!(
        "Total findings: {} (high: {high}, medium: {medium}, low: {low})\n\n",
        entries.len()
    ));

    for entry in entries {
        out.push_str(&format!(
            "[{}] {} — {}\n",
            entry.severity.as_str().to_uppercase(),
            entry.id,
            entry.title
        ));
        out.push_str(&format!(
            "  {} {}  point={}\n",
            entry.endpoint.method,
            entry.endpoint.url,
            entry.endpoint.parameter.as_deref().unwrap_or("-")
        ));
        out.push_str(&format!("  payload: {}\n", entry.payload));
        if let Some((base, cur)) = entry.evidence.status {
            out.push_str(&format!("  status: {base} -> {cur}"));
        }
        if let Some((base, cur)) = entry.evidence.length {
            out.push_str(&format!("  length: {base} -> {cur}"));
        }
        if let Some((base, cur)) = entry.evidence.time_ms {
            out.push_str(&format!("  time: {base}ms -> {cur}ms"));
        }
        out.push('\n');
        if let Some(ref keywords) = entry.evidence.keywords {
            out.push_str(&format!("  keywords: {}\n", keywords.join(", ")));
        }
        out.push_str(&format!("  confidence: {:.2}\n\n", entry.confidence));
    }

    out.push_str("═══════════════════════════════════════════════════════════════════\n");
    out
}
