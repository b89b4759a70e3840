use std::fmt;

use thiserror::Error;
use watch_core::{ExtractError, FingerprintError};

/// States a site passes through within one scan attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Fetching,
    Extracting,
    Comparing,
    Done,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Decode { encoding: String },
    NoPageOpen,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Decode { encoding } => write!(f, "could not decode page as {encoding}"),
            FailureKind::NoPageOpen => write!(f, "no page open"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Why one attempt at scanning a site failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("invalid site url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("comparison failed: {0}")]
    Fingerprint(#[from] FingerprintError),
}

impl ScanError {
    /// The stage the attempt was in when it failed.
    pub fn stage(&self) -> ScanStage {
        match self {
            ScanError::Fetch(_) | ScanError::InvalidUrl { .. } => ScanStage::Fetching,
            ScanError::Extract(_) => ScanStage::Extracting,
            ScanError::Fingerprint(_) => ScanStage::Comparing,
        }
    }
}
