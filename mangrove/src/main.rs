mod arguments;

use anyhow::{Context, bail};
use arguments::{Args, OutputFormat};
use clap::Parser;
use colored::Colorize;
use mangrove_core::{CrawlOptions, Method, Scanner, ScannerConfig, report};
use mangrove_transport::{AttemptMetrics, RetryPolicy};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let metrics = args
        .metrics
        .then(|| Arc::new(Mutex::new(AttemptMetrics::new())));

    let scanner = build_scanner(&args, metrics.clone())?;

    let mut findings = Vec::new();
    let mut fingerprint = None;

    if args.fingerprint {
        fingerprint = scanner.fingerprint(&args.url).await;
    }

    if args.crawl {
        let options = CrawlOptions {
            max_pages: args.max_pages,
            max_depth: args.max_depth,
            same_origin: !args.offsite,
        };
        findings.extend(scanner.crawl(&args.url, &options).await?);
    }

    if !args.get_params.is_empty() {
        findings.extend(scanner.scan_get(&args.url, &args.get_params).await?);
        if args.dos {
            findings.extend(scanner.scan_dos_get(&args.url, &args.get_params).await?);
        }
    }

    if !args.fields.is_empty() {
        let base_body: Value = match args.body.as_deref() {
            Some(raw) => serde_json::from_str(raw).context("invalid JSON in --body")?,
            None => json!({}),
        };
        let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("invalid HTTP method '{}'", args.method))?;
        findings.extend(
            scanner
                .scan_body(&args.url, method.clone(), &base_body, &args.fields)
                .await?,
        );
        if args.dos {
            findings.extend(
                scanner
                    .scan_dos_body(&args.url, method.clone(), &base_body, &args.fields)
                    .await?,
            );
        }
        if args.manipulation {
            findings.extend(
                scanner
                    .scan_manipulation(&args.url, method, &base_body, &args.fields)
                    .await?,
            );
        }
    }

    if args.headers_scan {
        findings.extend(scanner.scan_headers(&args.url, &args.header_names).await?);
    }

    if args.cookies_scan {
        findings.extend(scanner.scan_cookies(&args.url, &args.cookie_names).await?);
    }

    if args.graphql_scan {
        let Some(ref query) = args.graphql_query else {
            bail!("--graphql-scan requires --graphql-query");
        };
        if args.graphql_fields.is_empty() {
            bail!("--graphql-scan requires --graphql-fields");
        }
        findings.extend(
            scanner
                .scan_graphql(
                    &args.url,
                    args.graphql_opname.as_deref(),
                    query,
                    &args.graphql_fields,
                )
                .await?,
        );
    }

    match args.format {
        OutputFormat::Report => {
            let entries = report::build_report(&findings, args.family);
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            let entries = report::build_report(&findings, args.family);
            println!("{}", report::render_text(&entries));
        }
        OutputFormat::Raw => {
            if args.fingerprint {
                let combined = json!({ "fingerprint": fingerprint, "findings": findings });
                println!("{}", serde_json::to_string_pretty(&combined)?);
            } else if findings.is_empty() {
                println!("{}", "No obvious NoSQL injection indicators found.".green());
            } else {
                println!("{}", serde_json::to_string_pretty(&findings)?);
            }
        }
    }

    if let Some(metrics) = metrics {
        let summary = metrics.lock().unwrap().summary();
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

fn build_scanner(
    args: &Args,
    metrics: Option<Arc<Mutex<AttemptMetrics>>>,
) -> anyhow::Result<Scanner> {
    let mut config = ScannerConfig::new()
        .with_family(args.family)
        .with_timeout(Duration::from_millis(args.timeout))
        .with_delay(Duration::from_millis(args.delay))
        .with_timing_threshold(Duration::from_millis(args.dos_threshold));

    config.default_headers = parse_headers(&args.headers);
    config.retry = RetryPolicy::default()
        .with_max_attempts(args.retry_max_attempts)
        .with_base_delay(Duration::from_millis(args.retry_base_delay))
        .with_delay_cap(Duration::from_millis(args.retry_max_delay))
        .with_unsafe_retries(args.retry_unsafe);
    config.proxy = args.proxy.clone();
    config.debug = args.debug;

    if args.debug {
        config.debug_sink = Some(Arc::new(|event| {
            eprintln!("{} {} {}", "[DBG]".dimmed(), event.category, event.message);
        }));
    }
    if let Some(metrics) = metrics {
        config.attempt_sink = Some(Arc::new(move |record| {
            metrics.lock().unwrap().record(record);
        }));
    }

    Scanner::new(config).context("failed to construct scanner")
}

/// Parse repeatable `-H 'Name: value'` flags; malformed entries are dropped.
fn parse_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter()
        .filter_map(|header| {
            header
                .split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
        .collect()
}
