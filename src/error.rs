//! Error types for Poise

use crate::types::EstimatorKind;
use thiserror::Error;

/// Errors surfaced by the analysis engine and its outer surfaces
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to parse frame record: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    #[error("Landmark model load failed: {0}")]
    ModelLoad(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Failure of a single landmark estimation call.
///
/// The sampler never propagates these; a failed call counts as "nothing
/// detected" for that frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{estimator} estimator failed: {message}")]
pub struct EstimatorError {
    pub estimator: EstimatorKind,
    pub message: String,
}

impl EstimatorError {
    pub fn new(estimator: EstimatorKind, message: impl Into<String>) -> Self {
        Self {
            estimator,
            message: message.into(),
        }
    }
}
