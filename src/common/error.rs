//! Error types for mcl_slam

use thiserror::Error;

/// Main error type for the localization and mapping engine
#[derive(Debug, Error)]
pub enum SlamError {
    /// Invalid calibration or construction parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Every particle scored zero (or the sum was not finite)
    #[error("Degenerate weights: sensor scores sum to zero")]
    DegenerateWeights,
    /// The map has no cell a particle could be placed on
    #[error("No free space in map to sample poses from")]
    NoFreeSpace,
    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for engine operations
pub type SlamResult<T> = Result<T, SlamError>;
