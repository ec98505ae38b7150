// Passive engine identification from a single baseline fetch

use crate::scanner::Scanner;
use mangrove_transport::{Request, ResponseSnapshot};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static COUCH_SERVER_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)couchdb/(\d+\.\d+(?:\.\d+)?)").unwrap());

static MONGO_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)mongo(server|network)?error|mongoose").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub engine: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Where the identification came from, e.g. `header:server`.
    pub source: String,
}

impl Fingerprint {
    fn new(engine: &str, version: Option<String>, source: &str) -> Self {
        Self {
            engine: engine.to_string(),
            version,
            source: source.to_string(),
        }
    }
}

impl Scanner {
    /// Best-effort passive identification of the backing engine. Issues at
    /// most one request; every failure degrades to None.
    pub async fn fingerprint(&self, url: &str) -> Option<Fingerprint> {
        let target = Url::parse(url).ok()?;
        match self.fetch(Request::get(target)).await {
            Ok(snapshot) => detect(&snapshot),
            Err(err) => {
                debug!(url, error = %err, "fingerprint fetch failed");
                None
            }
        }
    }
}

/// Fixed-priority pattern ladder; the first match wins.
pub(crate) fn detect(snapshot: &ResponseSnapshot) -> Option<Fingerprint> {
    let server = snapshot.header("server").unwrap_or("");
    if let Some(captures) = COUCH_SERVER_HEADER.captures(server) {
        return Some(Fingerprint::new(
            "CouchDB",
            Some(captures[1].to_string()),
            "header:server",
        ));
    }

    if snapshot
        .header("x-couchdb")
        .is_some_and(|value| value.to_ascii_lowercase().contains("couchdb"))
        && let Some(version) = snapshot.header("x-couchdb-version")
    {
        return Some(Fingerprint::new(
            "CouchDB",
            Some(version.to_string()),
            "header:x-couchdb-version",
        ));
    }

    if snapshot
        .header("x-elastic-product")
        .is_some_and(|value| value.eq_ignore_ascii_case("elasticsearch"))
    {
        if let Ok(body) = serde_json::from_str::<Value>(&snapshot.text)
            && let Some(version) = body.pointer("/version/number").and_then(Value::as_str)
        {
            return Some(Fingerprint::new(
                "Elasticsearch",
                Some(version.to_string()),
                "body:json",
            ));
        }
        return Some(Fingerprint::new(
            "Elasticsearch",
            None,
            "header:x-elastic-product",
        ));
    }

    if let Ok(body) = serde_json::from_str::<Value>(&snapshot.text)
        && body.get("couchdb").and_then(Value::as_str) == Some("Welcome")
        && let Some(version) = body.get("version").and_then(Value::as_str)
    {
        return Some(Fingerprint::new(
            "CouchDB",
            Some(version.to_string()),
            "body:json",
        ));
    }

    if MONGO_BODY.is_match(&snapshot.text) {
        return Some(Fingerprint::new("MongoDB", None, "body:text"));
    }

    None
}
