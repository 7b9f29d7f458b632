// src/errors.rs

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T, E = AppError> = std::result::Result<T, E>;

// Variants carry String payloads rather than the source error types so the
// enum stays `Clone` (background tasks log and drop errors that may also be
// surfaced elsewhere).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // --- Request/Input Errors ---
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Invalid Input: {0}")]
    InvalidInput(String),

    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    #[error("Unsupported character card version: {0}")]
    UnsupportedCardVersion(String),

    // --- Persistence Errors (surfaced by the storage collaborator) ---
    #[error("Storage error: {0}")]
    StorageError(String),

    // --- External Service Errors ---
    #[error("LLM Client Error: {0}")]
    LlmClientError(String),

    #[error("LLM Generation Error: {0}")]
    GenerationError(String),

    // --- General/Internal Errors ---
    #[error("Serialization Error: {0}")]
    SerializationError(String),
}

impl AppError {
    /// True for the "feature absent" error kind that best-effort callers
    /// (the request assembler) downgrade to `None` instead of failing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<genai::Error> for AppError {
    fn from(err: genai::Error) -> Self {
        Self::LlmClientError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_distinguishable() {
        let err = AppError::NotFound("lorebook 7".to_string());
        assert!(err.is_not_found());
        assert!(!AppError::StorageError("pool gone".to_string()).is_not_found());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = AppError::InvalidRegex("unclosed group".to_string());
        assert_eq!(err.to_string(), "Invalid regex pattern: unclosed group");
    }

    #[test]
    fn test_serde_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err = AppError::from(json_err);
        assert!(matches!(err, AppError::SerializationError(_)));
    }
}
