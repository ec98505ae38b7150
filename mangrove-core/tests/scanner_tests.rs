// End-to-end strategy behavior against a live mock server

use mangrove_core::payloads::{TIMING_STRING_PAYLOADS, string_payloads};
use mangrove_core::{Method, Scanner, ScannerConfig, Tag, TargetFamily};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scanner() -> Scanner {
    Scanner::new(
        ScannerConfig::new()
            .with_timeout(Duration::from_secs(5))
            .with_delay(Duration::ZERO),
    )
    .unwrap()
}

fn first_payload() -> &'static str {
    string_payloads(TargetFamily::MongoDb)[0]
}

#[tokio::test]
async fn probe_drift_is_tagged_as_anomaly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("q", first_payload()))
        .respond_with(ResponseTemplate::new(500).set_body_string("MongoError: simulated"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_get(&format!("{}/item", server.uri()), &["q".to_string()])
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.point, "q");
    assert_eq!(finding.method, "GET");
    assert_eq!(finding.evidence.status_delta, 300);
    assert!(finding
        .evidence
        .keyword_hits
        .contains(&"MongoError".to_string()));
    assert_eq!(finding.tags, vec![Tag::Anomaly]);
}

#[tokio::test]
async fn identical_responses_yield_no_findings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/steady"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_get(&format!("{}/steady", server.uri()), &["q".to_string()])
        .await
        .unwrap();

    assert!(findings.is_empty());
}

#[tokio::test]
async fn repeated_scans_produce_identical_tag_sets() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .and(query_param("q", first_payload()))
        .respond_with(ResponseTemplate::new(500).set_body_string("MongoError: simulated"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let scanner = scanner();
    let url = format!("{}/item", server.uri());
    let first = scanner.scan_get(&url, &["q".to_string()]).await.unwrap();
    let second = scanner.scan_get(&url, &["q".to_string()]).await.unwrap();

    let tags = |findings: &[mangrove_core::Finding]| -> Vec<Vec<Tag>> {
        findings.iter().map(|f| f.tags.clone()).collect()
    };
    assert_eq!(tags(&first), tags(&second));
}

#[tokio::test]
async fn slow_probe_is_tagged_timing_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/report"))
        .and(query_param("q", TIMING_STRING_PAYLOADS[0]))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("ok")
                .set_delay(Duration::from_millis(1600)),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_dos_get(&format!("{}/report", server.uri()), &["q".to_string()])
        .await
        .unwrap();

    // status and length never changed; the time delta alone carries it
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].tags, vec![Tag::Timing]);
    assert!(findings[0].evidence.time_delta_ms >= 1000);
    assert_eq!(findings[0].evidence.status_delta, 0);
}

#[tokio::test]
async fn body_templates_are_merged_over_the_base_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_partial_json(json!({ "user": { "$ne": "alice" } })))
        .respond_with(ResponseTemplate::new(500).set_body_string("MongoError: cast failure"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_body(
            &format!("{}/login", server.uri()),
            Method::POST,
            &json!({ "user": "alice", "pass": "secret" }),
            &["user".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].point, "user");
    assert_eq!(findings[0].method, "POST");
    assert_eq!(findings[0].payload, json!({ "$ne": "alice" }));
    assert_eq!(findings[0].tags, vec![Tag::Anomaly]);
}

#[tokio::test]
async fn graphql_variables_carry_the_injection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "name": { "$ne": "" } } })))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(
                r#"{"data":{"users":[{"id":1},{"id":2},{"id":3},{"id":4},{"id":5},{"id":6}]}}"#,
            ),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{"users":[]}}"#))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_graphql(
            &format!("{}/graphql", server.uri()),
            Some("Users"),
            "query Users($name: String) { users(name: $name) { id } }",
            &["name".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].point, "graphql:variables.name");
    assert!(findings[0].tags.contains(&Tag::Anomaly));
}

#[tokio::test]
async fn header_probes_use_the_named_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(header("X-Filter", first_payload()))
        .respond_with(ResponseTemplate::new(500).set_body_string("MongoError: bad filter"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_headers(&format!("{}/api", server.uri()), &["X-Filter".to_string()])
        .await
        .unwrap();

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].point, "X-Filter");
}

#[tokio::test]
async fn cookie_probes_report_the_cookie_point() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(header_exists("cookie"))
        .respond_with(ResponseTemplate::new(500).set_body_string("MongoError: bad session"))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_cookies(&format!("{}/api", server.uri()), &["session".to_string()])
        .await
        .unwrap();

    // every payload drifts, so every probe emits
    assert_eq!(findings.len(), string_payloads(TargetFamily::MongoDb).len());
    assert!(findings.iter().all(|f| f.point == "Cookie:session"));
}

#[tokio::test]
async fn manipulation_gates_on_the_updated_count_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"modifiedCount":7}"#))
        .mount(&server)
        .await;

    let findings = scanner()
        .scan_manipulation(
            &format!("{}/update", server.uri()),
            Method::POST,
            &json!({ "status": "active" }),
            &["status".to_string()],
        )
        .await
        .unwrap();

    // both broadening templates trip the gate; nothing else is consulted
    assert_eq!(findings.len(), 2);
    assert!(findings.iter().all(|f| f.tags == vec![Tag::Manipulation]));
    assert!(findings.iter().all(|f| f.evidence.updated_count == 7));
}

#[tokio::test]
async fn default_headers_ride_along_on_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .and(header("Authorization", "Bearer token123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let mut config = ScannerConfig::new()
        .with_timeout(Duration::from_secs(5))
        .with_delay(Duration::ZERO);
    config.default_headers = vec![("Authorization".to_string(), "Bearer token123".to_string())];
    let scanner = Scanner::new(config).unwrap();

    // without the header every request would 404 against the mock
    let findings = scanner
        .scan_get(&format!("{}/api", server.uri()), &["q".to_string()])
        .await
        .unwrap();
    assert!(findings.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert!(!requests.is_empty());
    assert!(requests
        .iter()
        .all(|r| r.headers.get("authorization").is_some()));
}
