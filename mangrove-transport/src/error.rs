use crate::snapshot::AttemptRecord;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Raised only when every attempt failed without producing a status.
    #[error("request to {url} failed after {attempts} attempt(s): {message}")]
    Exhausted {
        url: String,
        attempts: u32,
        message: String,
        attempt_log: Vec<AttemptRecord>,
    },
}

impl TransportError {
    /// The attempt trail of the failed call, when one exists.
    pub fn attempt_log(&self) -> &[AttemptRecord] {
        match self {
            TransportError::Exhausted { attempt_log, .. } => attempt_log,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
