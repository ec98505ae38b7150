pub mod client;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod retry;
pub mod snapshot;

pub use client::{Request, Transport, TransportConfig};
pub use error::TransportError;
pub use metrics::AttemptMetrics;
pub use proxy::ProxySettings;
pub use reqwest::Method;
pub use retry::RetryPolicy;
pub use snapshot::{AttemptOutcome, AttemptRecord, AttemptSink, ResponseSnapshot};
