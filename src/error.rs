//! Error types for the Kolosal text feature generators

use thiserror::Error;

/// Result type alias for Kolosal operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Main error type for the text feature generators
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    /// The vectorizer could not learn a usable vocabulary.
    #[error("Empty vocabulary: {0}")]
    EmptyVocabulary(String),

    #[error("Memory allocation error: {0}")]
    MemoryError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl KolosalError {
    /// Whether this error signals memory exhaustion.
    pub fn is_memory_error(&self) -> bool {
        matches!(self, KolosalError::MemoryError(_))
    }
}

impl From<polars::error::PolarsError> for KolosalError {
    fn from(err: polars::error::PolarsError) -> Self {
        KolosalError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

impl From<regex::Error> for KolosalError {
    fn from(err: regex::Error) -> Self {
        KolosalError::ConfigError(format!("invalid token pattern: {}", err))
    }
}
