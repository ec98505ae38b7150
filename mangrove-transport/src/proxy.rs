// Proxy resolution with NO_PROXY-style bypass rules

use std::env;
use url::Url;

/// Snapshot of the proxy environment plus an optional explicit override.
/// Resolution order per target: bypass list first (a bypass always wins),
/// then the explicit override, then the protocol-matched environment proxy,
/// then none. Unparseable values degrade to "no proxy".
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    pub proxy_override: Option<Url>,
    pub http_proxy: Option<Url>,
    pub https_proxy: Option<Url>,
    pub no_proxy: Vec<String>,
}

impl ProxySettings {
    /// Read HTTP_PROXY / HTTPS_PROXY / NO_PROXY (and lowercase variants)
    /// once; the snapshot never re-reads the environment.
    pub fn from_env() -> Self {
        Self {
            proxy_override: None,
            http_proxy: env_url(&["HTTP_PROXY", "http_proxy"]),
            https_proxy: env_url(&["HTTPS_PROXY", "https_proxy"]),
            no_proxy: env::var("NO_PROXY")
                .or_else(|_| env::var("no_proxy"))
                .map(|raw| parse_no_proxy(&raw))
                .unwrap_or_default(),
        }
    }

    pub fn with_override(mut self, proxy: Option<Url>) -> Self {
        self.proxy_override = proxy;
        self
    }

    pub fn resolve(&self, target: &Url) -> Option<Url> {
        if self.bypasses(target) {
            return None;
        }
        if let Some(ref proxy) = self.proxy_override {
            return Some(proxy.clone());
        }
        match target.scheme() {
            "http" => self.http_proxy.clone(),
            "https" => self.https_proxy.clone(),
            _ => None,
        }
    }

    /// NO_PROXY semantics: `*` bypasses everything; a leading-dot entry
    /// matches as a domain suffix; an entry containing `:` requires an exact
    /// host:port match (the target port defaulting to 80/443 by scheme); a
    /// bare hostname matches only at the scheme's default port, so
    /// `x.com` does not bypass `x.com:8080`.
    pub fn bypasses(&self, target: &Url) -> bool {
        let Some(host) = target.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let default_port = if target.scheme() == "https" { 443 } else { 80 };
        let port = target.port().unwrap_or(default_port);

        for entry in &self.no_proxy {
            if entry == "*" {
                return true;
            }
            if entry.contains(':') {
                if *entry == format!("{host}:{port}") {
                    return true;
                }
            } else if entry.starts_with('.') {
                if host.ends_with(entry.as_str()) {
                    return true;
                }
            } else if *entry == host && port == default_port {
                return true;
            }
        }
        false
    }
}

fn parse_no_proxy(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|entry| entry.trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn env_url(names: &[&str]) -> Option<Url> {
    names
        .iter()
        .find_map(|name| env::var(name).ok())
        .and_then(|value| Url::parse(&value).ok())
}
