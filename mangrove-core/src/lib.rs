pub mod config;
pub mod crawler;
pub mod debug;
pub mod error;
pub mod evidence;
pub mod fingerprint;
pub mod finding;
pub mod payloads;
pub mod report;
pub mod scanner;

pub use config::ScannerConfig;
pub use crawler::CrawlOptions;
pub use debug::{DebugEvent, DebugLogger, DebugSink};
pub use error::ScanError;
pub use evidence::{Analyzer, Evidence, Thresholds};
pub use fingerprint::Fingerprint;
pub use finding::{Finding, Tag};
pub use mangrove_transport::Method;
pub use payloads::TargetFamily;
pub use scanner::Scanner;
