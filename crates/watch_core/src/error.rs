use thiserror::Error;

use crate::fingerprint::Strategy;

/// Failure to derive a fingerprint from a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("document has no elements")]
    NoElementsFound,
}

/// Failure to interpret or compare stored fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FingerprintError {
    #[error("unsupported fingerprint type: {shape}")]
    UnsupportedFingerprintType { shape: &'static str },
    #[error("stored {stored:?} fingerprint cannot be compared with a {current:?} fingerprint")]
    VariantMismatch { stored: Strategy, current: Strategy },
}
