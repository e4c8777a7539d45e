// src/utils/error.rs
use thiserror::Error;

use crate::extractors::report::TerminalStatus;

// Errors raised while talking to the document provider
#[derive(Error, Debug)]
pub enum EdgarError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode),

    #[error("Provider rate limit likely exceeded")]
    RateLimited,

    #[error("Missing API key: set the {0} environment variable")]
    MissingApiKey(String),

    #[error("Could not find filing document: {0}")]
    FilingDocNotFound(String),

    #[error("Failed to parse provider response: {0}")]
    Parse(String),
}

/// Failure of one pipeline stage. Self-terminations carry one of the
/// enumerated statuses; anything unexpected is a `Stage` failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("extraction terminated: {0}")]
    Terminated(TerminalStatus),

    #[error("stage `{stage}` failed: {message}")]
    Stage { stage: &'static str, message: String },
}

impl ExtractError {
    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        ExtractError::Stage {
            stage,
            message: message.into(),
        }
    }
}

impl From<TerminalStatus> for ExtractError {
    fn from(status: TerminalStatus) -> Self {
        ExtractError::Terminated(status)
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Provider interaction failed: {0}")]
    Edgar(#[from] EdgarError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status_converts_into_extract_error() {
        let err: ExtractError = TerminalStatus::NumTablesZero.into();
        assert_eq!(err, ExtractError::Terminated(TerminalStatus::NumTablesZero));
        assert_eq!(err.to_string(), "extraction terminated: num_tables_zero");
    }

    #[test]
    fn test_stage_error_display_names_stage() {
        let err = ExtractError::stage("date_resolver", "day token overflow");
        assert_eq!(err.to_string(), "stage `date_resolver` failed: day token overflow");
    }
}
