//! Error types for stairseg

use thiserror::Error;

/// Main error type for stairseg operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Insufficient points: need at least {required}, found {found}")]
    InsufficientPoints { required: usize, found: usize },

    #[error("No plane model found")]
    NoModelFound,

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Cluster of {size} points outside bounds [{min}, {max}]")]
    ClusterSizeOutOfBounds { size: usize, min: usize, max: usize },

    #[error("Malformed input at point {index}: {reason}")]
    MalformedInput { index: usize, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for the failures the decomposition absorbs as control flow
    /// ("no plane here", "no cluster here") rather than reporting.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientPoints { .. }
                | Error::NoModelFound
                | Error::DegenerateGeometry(_)
                | Error::ClusterSizeOutOfBounds { .. }
        )
    }
}

/// Result type alias for stairseg operations
pub type Result<T> = std::result::Result<T, Error>;
