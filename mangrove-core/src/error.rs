use mangrove_transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ScanError>;

pub(crate) fn parse_url(raw: &str) -> Result<url::Url> {
    url::Url::parse(raw).map_err(|e| ScanError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}
