// Bounded breadth-first site discovery feeding the scan strategies.
// Frontier state is scoped to one crawl call and discarded at its end.

use crate::error::{Result, parse_url};
use crate::finding::Finding;
use crate::scanner::Scanner;
use mangrove_transport::{Method, Request};
use scraper::{Html, Selector};
use serde_json::{Map, Value, json};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Overall page visit limit.
    pub max_pages: usize,
    /// Link depth limit; the start URL is depth 0.
    pub max_depth: usize,
    /// Drop anchors and form actions pointing off the start origin.
    pub same_origin: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 50,
            max_depth: 3,
            same_origin: true,
        }
    }
}

/// Call-scoped traversal state. A URL enqueues at most once (normalized,
/// fragment stripped); a (method, origin+path, sorted parameter names)
/// signature scans at most once per crawl.
struct Frontier {
    queue: VecDeque<(Url, usize)>,
    enqueued: HashSet<String>,
    visited: HashSet<String>,
    signatures: HashSet<String>,
}

impl Frontier {
    fn new(start: Url) -> Self {
        let mut frontier = Self {
            queue: VecDeque::new(),
            enqueued: HashSet::new(),
            visited: HashSet::new(),
            signatures: HashSet::new(),
        };
        frontier.enqueue(start, 0);
        frontier
    }

    fn enqueue(&mut self, url: Url, depth: usize) -> bool {
        if !self.enqueued.insert(url.to_string()) {
            return false;
        }
        self.queue.push_back((url, depth));
        true
    }

    fn next(&mut self) -> Option<(Url, usize)> {
        self.queue.pop_front()
    }

    fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(url.to_string())
    }

    fn visited_count(&self) -> usize {
        self.visited.len()
    }

    fn claim_signature(&mut self, signature: String) -> bool {
        self.signatures.insert(signature)
    }
}

/// A form found on a page, with its controls already resolved.
struct PageForm {
    method: String,
    action: Url,
    fields: Vec<String>,
}

impl Scanner {
    /// Crawl from `start_url`, scanning every newly discovered parameterized
    /// link and form along the way. Returns all findings in discovery order.
    /// A dead page or endpoint is skipped; the crawl keeps going.
    pub async fn crawl(&self, start_url: &str, options: &CrawlOptions) -> Result<Vec<Finding>> {
        let start = normalize(&parse_url(start_url)?);
        let mut frontier = Frontier::new(start.clone());
        let mut findings = Vec::new();

        while frontier.visited_count() < options.max_pages {
            let Some((url, depth)) = frontier.next() else {
                break;
            };
            if !frontier.mark_visited(&url) {
                continue;
            }

            let page = match self.fetch(Request::get(url.clone())).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(url = %url, error = %err, "page fetch failed, skipping");
                    continue;
                }
            };
            self.logger.emit(
                "crawler",
                format!("fetched {url}"),
                Some(json!({ "status": page.status, "length": page.length })),
            );
            if !looks_like_html(&page.text) {
                continue;
            }

            let (anchors, forms) = extract_page(&page.text, &url);

            for link in anchors {
                if options.same_origin && !same_origin(&start, &link) {
                    debug!(link = %link, "cross-origin anchor dropped");
                    continue;
                }
                let link = normalize(&link);
                if depth + 1 <= options.max_depth {
                    frontier.enqueue(link.clone(), depth + 1);
                }

                let params = param_names(&link);
                if params.is_empty() {
                    continue;
                }
                if frontier.claim_signature(scan_signature("GET", &link, &params)) {
                    self.logger.emit(
                        "crawler",
                        format!("scan link {link}"),
                        Some(json!({ "params": &params })),
                    );
                    match self.scan_get(link.as_str(), &params).await {
                        Ok(link_findings) => findings.extend(link_findings),
                        Err(err) => warn!(link = %link, error = %err, "link scan failed"),
                    }
                }
            }

            for form in forms {
                if options.same_origin && !same_origin(&start, &form.action) {
                    debug!(action = %form.action, "cross-origin form dropped");
                    continue;
                }
                let signature = scan_signature(&form.method, &form.action, &form.fields);
                if !frontier.claim_signature(signature) {
                    continue;
                }
                if form.method == "GET" {
                    self.logger.emit(
                        "crawler",
                        format!("scan form GET {}", form.action),
                        Some(json!({ "fields": &form.fields })),
                    );
                    match self.scan_get(form.action.as_str(), &form.fields).await {
                        Ok(form_findings) => findings.extend(form_findings),
                        Err(err) => {
                            warn!(action = %form.action, error = %err, "form scan failed")
                        }
                    }
                } else {
                    // harmless placeholder for every control; enough for the
                    // endpoint to see a well-formed body
                    let mut body = Map::new();
                    for field in &form.fields {
                        body.insert(field.clone(), Value::String("a".to_string()));
                    }
                    let method =
                        Method::from_bytes(form.method.as_bytes()).unwrap_or(Method::POST);
                    self.logger.emit(
                        "crawler",
                        format!("scan form {} {}", form.method, form.action),
                        Some(json!({ "fields": &form.fields })),
                    );
                    match self
                        .scan_body(
                            form.action.as_str(),
                            method,
                            &Value::Object(body),
                            &form.fields,
                        )
                        .await
                    {
                        Ok(form_findings) => findings.extend(form_findings),
                        Err(err) => {
                            warn!(action = %form.action, error = %err, "form scan failed")
                        }
                    }
                }
            }
        }

        Ok(findings)
    }
}

/// Pull anchors and named forms out of one page. Synchronous on purpose:
/// the parsed document never crosses an await point.
fn extract_page(html: &str, page_url: &Url) -> (Vec<Url>, Vec<PageForm>) {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("a[href]").unwrap();
    let form_selector = Selector::parse("form").unwrap();
    let control_selector = Selector::parse("input[name], select[name], textarea[name]").unwrap();

    let mut anchors = Vec::new();
    let mut seen = HashSet::new();
    for element in document.select(&anchor_selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Some(resolved) = resolve_href(page_url, href) else {
            continue;
        };
        if seen.insert(resolved.to_string()) {
            anchors.push(resolved);
        }
    }

    let mut forms = Vec::new();
    for form in document.select(&form_selector) {
        let method = form
            .value()
            .attr("method")
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let action = form.value().attr("action").unwrap_or("");
        let target = if action.is_empty() {
            normalize(page_url)
        } else {
            match page_url.join(action) {
                Ok(joined) => normalize(&joined),
                Err(_) => continue,
            }
        };

        let mut fields = Vec::new();
        let mut seen_fields = HashSet::new();
        for control in form.select(&control_selector) {
            if let Some(name) = control.value().attr("name")
                && seen_fields.insert(name.to_string())
            {
                fields.push(name.to_string());
            }
        }
        if fields.is_empty() {
            continue;
        }
        forms.push(PageForm {
            method,
            action: target,
            fields,
        });
    }

    (anchors, forms)
}

fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    base.join(href).ok().map(|resolved| normalize(&resolved))
}

fn normalize(url: &Url) -> Url {
    let mut normalized = url.clone();
    normalized.set_fragment(None);
    normalized
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Unique query parameter names in first-appearance order.
fn param_names(url: &Url) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();
    for (name, _) in url.query_pairs() {
        let name = name.into_owned();
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    names
}

/// Crawl-dedup key: method, origin+path, sorted parameter names. The query
/// string itself stays out so differently-valued links collapse.
fn scan_signature(method: &str, url: &Url, params: &[String]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort();
    format!(
        "{method} {}{}?{}",
        url.origin().ascii_serialization(),
        url.path(),
        sorted.join(",")
    )
}

fn looks_like_html(text: &str) -> bool {
    text.as_bytes()
        .windows(2)
        .any(|pair| pair[0] == b'<' && (pair[1].is_ascii_alphanumeric() || pair[1] == b'_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn frontier_enqueues_each_url_once() {
        let mut frontier = Frontier::new(url("http://t.example/"));
        assert!(frontier.enqueue(url("http://t.example/a"), 1));
        assert!(!frontier.enqueue(url("http://t.example/a"), 1));
        assert!(!frontier.enqueue(url("http://t.example/"), 2));

        let mut drained = Vec::new();
        while let Some((u, _)) = frontier.next() {
            drained.push(u.to_string());
        }
        assert_eq!(drained, vec!["http://t.example/", "http://t.example/a"]);
    }

    #[test]
    fn frontier_claims_each_signature_once() {
        let mut frontier = Frontier::new(url("http://t.example/"));
        let sig = scan_signature("GET", &url("http://t.example/search?q=1"), &["q".to_string()]);
        assert!(frontier.claim_signature(sig.clone()));
        assert!(!frontier.claim_signature(sig));
    }

    #[test]
    fn signature_ignores_values_and_sorts_names() {
        let a = scan_signature(
            "GET",
            &url("http://t.example/search?q=first&page=1"),
            &["q".to_string(), "page".to_string()],
        );
        let b = scan_signature(
            "GET",
            &url("http://t.example/search?page=9&q=other"),
            &["page".to_string(), "q".to_string()],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn signature_distinguishes_methods_and_paths() {
        let get = scan_signature("GET", &url("http://t.example/login"), &["u".to_string()]);
        let post = scan_signature("POST", &url("http://t.example/login"), &["u".to_string()]);
        let other = scan_signature("GET", &url("http://t.example/logout"), &["u".to_string()]);
        assert_ne!(get, post);
        assert_ne!(get, other);
    }

    #[test]
    fn normalize_strips_fragments() {
        assert_eq!(
            normalize(&url("http://t.example/page#section")).as_str(),
            "http://t.example/page"
        );
    }

    #[test]
    fn same_origin_compares_scheme_host_and_port() {
        let base = url("http://t.example/");
        assert!(same_origin(&base, &url("http://t.example/deep/path")));
        assert!(same_origin(&base, &url("http://t.example:80/x")));
        assert!(!same_origin(&base, &url("https://t.example/")));
        assert!(!same_origin(&base, &url("http://other.example/")));
        assert!(!same_origin(&base, &url("http://t.example:8080/")));
    }

    #[test]
    fn resolve_href_skips_inert_links() {
        let base = url("http://t.example/dir/page");
        assert!(resolve_href(&base, "#top").is_none());
        assert!(resolve_href(&base, "javascript:void(0)").is_none());
        assert!(resolve_href(&base, "mailto:a@b.c").is_none());
        assert!(resolve_href(&base, "tel:+123").is_none());
        assert_eq!(
            resolve_href(&base, "../other?x=1#frag").unwrap().as_str(),
            "http://t.example/other?x=1"
        );
    }

    #[test]
    fn extract_page_finds_anchors_and_named_forms() {
        let html = r#"<html><body>
            <a href="/search?q=test">Search</a>
            <a href="/search?q=test">Duplicate</a>
            <a href="http://off.example/x">Offsite</a>
            <form method="post" action="/login">
                <input name="username">
                <select name="role"></select>
                <textarea name="bio"></textarea>
                <input type="submit" value="go">
            </form>
            <form action="/empty"><input type="text"></form>
        </body></html>"#;
        let (anchors, forms) = extract_page(html, &url("http://t.example/"));

        assert_eq!(anchors.len(), 2);
        assert_eq!(anchors[0].as_str(), "http://t.example/search?q=test");

        // the nameless form is dropped
        assert_eq!(forms.len(), 1);
        assert_eq!(forms[0].method, "POST");
        assert_eq!(forms[0].action.as_str(), "http://t.example/login");
        assert_eq!(forms[0].fields, vec!["username", "role", "bio"]);
    }

    #[test]
    fn param_names_dedup_preserving_order() {
        let names = param_names(&url("http://t.example/s?b=1&a=2&b=3"));
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn html_sniffing_accepts_tags_only() {
        assert!(looks_like_html("<html><body>x</body></html>"));
        assert!(looks_like_html("text with <a href='x'>link</a>"));
        assert!(!looks_like_html("{\"json\": true}"));
        assert!(!looks_like_html("a < b and b > c"));
    }
}
