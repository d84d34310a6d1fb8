use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid version number: {0}")]
    InvalidVersion(String),
}
