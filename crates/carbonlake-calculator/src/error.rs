//! Calculator error taxonomy

use carbonlake_common::CommonError;
use thiserror::Error;

/// Result type alias for calculator operations
pub type Result<T> = std::result::Result<T, CalculatorError>;

/// Errors raised while enriching and persisting activity events
///
/// None of these are retried by the calculator; a failing batch fails the run.
#[derive(Error, Debug)]
pub enum CalculatorError {
    /// No emission factor row for the exact (category, activity) pair
    #[error("No emission factor for category '{category}' and activity '{activity}'")]
    NotFound { category: String, activity: String },

    /// Malformed or missing mandatory event field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reference data holds a factor that is not a non-negative number
    #[error("Invalid emission factor {field} = '{value}'")]
    InvalidFactor { field: String, value: String },

    #[error("Source store unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Reference store unavailable: {0}")]
    ReferenceUnavailable(String),

    /// A downstream write failed
    #[error("Sink '{sink}' unavailable: {message}")]
    SinkUnavailable { sink: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CalculatorError {
    pub fn not_found(category: impl Into<String>, activity: impl Into<String>) -> Self {
        CalculatorError::NotFound {
            category: category.into(),
            activity: activity.into(),
        }
    }

    pub fn sink(sink: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        CalculatorError::SinkUnavailable {
            sink: sink.to_string(),
            message: format!("{:#}", err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CalculatorError::NotFound { .. })
    }
}

impl From<CommonError> for CalculatorError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::InvalidInput(msg) => CalculatorError::InvalidInput(msg),
            CommonError::InvalidFactor { field, value } => {
                CalculatorError::InvalidFactor { field, value }
            },
            CommonError::Serialization(e) => CalculatorError::Serialization(e),
            CommonError::Config(msg) => CalculatorError::Config(msg),
        }
    }
}
