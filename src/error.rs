use thiserror::Error;

/// Error types for the gammacal-rs library.
#[derive(Error, Debug)]
pub enum GammaCalError {
    /// Malformed spectrum file, or a structural marker is missing.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The header/footer skip counts do not agree with the file content.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The optimizer did not converge, or produced an unusable solution.
    #[error("Fit failed to converge: {0}")]
    FitConvergence(String),

    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The input does not carry enough information for the requested quantity.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for gammacal-rs operations.
pub type Result<T> = std::result::Result<T, GammaCalError>;
