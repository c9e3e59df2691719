//! Error types for the object runtime

use thiserror::Error;

/// Result codes reported by runtime operations.
///
/// Returned synchronously from API calls and delivered to callbacks for
/// asynchronous requests, so the type is `Copy`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlError {
    #[error("Parameter invalid")]
    ParameterInvalid,

    #[error("Feature unsupported")]
    FeatureUnsupported,

    #[error("Resource exhausted")]
    ResourceExhausted,

    #[error("Operation not valid in the current state")]
    InvalidState,

    #[error("Buffer insufficient")]
    BufferInsufficient,

    #[error("Operation aborted")]
    OperationAborted,

    #[error("Internal error")]
    Internal,
}

/// Result type for runtime operations
pub type SlResult<T> = std::result::Result<T, SlError>;

/// Crate-level error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Runtime error: {0}")]
    Runtime(#[from] SlError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_wraps_result_code() {
        let err: Error = SlError::BufferInsufficient.into();
        assert!(matches!(err, Error::Runtime(SlError::BufferInsufficient)));
        assert_eq!(err.to_string(), "Runtime error: Buffer insufficient");
    }
}
