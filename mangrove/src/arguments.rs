use clap::{Parser, ValueEnum};
use mangrove_core::TargetFamily;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Findings as pretty JSON
    Raw,
    /// Report entries as pretty JSON
    Report,
    /// Report entries rendered for the terminal
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "mangrove", version, about = "Differential NoSQL injection scanner")]
pub struct Args {
    /// Target URL
    pub url: String,

    /// Comma-separated GET parameters to test
    #[arg(short = 'g', long, value_delimiter = ',')]
    pub get_params: Vec<String>,

    /// Crawl the site starting from the URL and scan discovered links/forms
    #[arg(short = 'C', long)]
    pub crawl: bool,

    /// Crawl page limit
    #[arg(long, default_value_t = 50)]
    pub max_pages: usize,

    /// Crawl depth limit
    #[arg(long, default_value_t = 3)]
    pub max_depth: usize,

    /// Allow offsite (cross-origin) links during crawl
    #[arg(long)]
    pub offsite: bool,

    /// Try to detect the database engine and version first
    #[arg(short = 'F', long)]
    pub fingerprint: bool,

    /// HTTP method for body scans
    #[arg(short = 'X', long, default_value = "POST")]
    pub method: String,

    /// Comma-separated JSON body fields to test
    #[arg(short = 'f', long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Base JSON body string
    #[arg(short = 'd', long)]
    pub body: Option<String>,

    /// Add timing payloads on top of the regular ones
    #[arg(long)]
    pub dos: bool,

    /// Try broad filters to detect mass updates
    #[arg(long)]
    pub manipulation: bool,

    /// Timeout per request (ms)
    #[arg(short = 't', long, default_value_t = 8000)]
    pub timeout: u64,

    /// Delay between requests (ms)
    #[arg(short = 'D', long, default_value_t = 50)]
    pub delay: u64,

    /// Extra header, repeatable, e.g. -H 'Authorization: Bearer ...'
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Time delta (ms) treated as a timing finding
    #[arg(long, default_value_t = 1000)]
    pub dos_threshold: u64,

    /// Target DB family (MongoDB|Elasticsearch|CouchDB)
    #[arg(long, default_value = "MongoDB")]
    pub family: TargetFamily,

    /// Fuzz selected request headers with payloads
    #[arg(long)]
    pub headers_scan: bool,

    /// Comma-separated header names to fuzz
    #[arg(long, value_delimiter = ',')]
    pub header_names: Vec<String>,

    /// Fuzz selected cookies with payloads
    #[arg(long)]
    pub cookies_scan: bool,

    /// Comma-separated cookie names to fuzz
    #[arg(long, value_delimiter = ',')]
    pub cookie_names: Vec<String>,

    /// Scan a GraphQL endpoint by fuzzing variables
    #[arg(long)]
    pub graphql_scan: bool,

    /// GraphQL operation (query/mutation) string
    #[arg(long)]
    pub graphql_query: Option<String>,

    /// GraphQL operationName
    #[arg(long)]
    pub graphql_opname: Option<String>,

    /// Comma-separated GraphQL variable fields to fuzz
    #[arg(long, value_delimiter = ',')]
    pub graphql_fields: Vec<String>,

    /// Attempts per request, including the first
    #[arg(long, default_value_t = 1)]
    pub retry_max_attempts: u32,

    /// Initial backoff base (ms)
    #[arg(long, default_value_t = 200)]
    pub retry_base_delay: u64,

    /// Backoff cap (ms)
    #[arg(long, default_value_t = 2000)]
    pub retry_max_delay: u64,

    /// Allow retrying non-idempotent methods
    #[arg(long)]
    pub retry_unsafe: bool,

    /// Explicit proxy override (beats HTTP_PROXY/HTTPS_PROXY)
    #[arg(long)]
    pub proxy: Option<Url>,

    /// Output format
    #[arg(long, value_enum, default_value = "raw")]
    pub format: OutputFormat,

    /// Emit structured debug events to stderr
    #[arg(long)]
    pub debug: bool,

    /// Print an HTTP attempt metrics summary to stderr at the end
    #[arg(long)]
    pub metrics: bool,
}
