use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Pattern not found: {pattern_id}")]
    PatternNotFound { pattern_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {message}")]
    Serialization { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Text-generation service errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Reasons the pattern extractor declines to produce a pattern.
///
/// Extraction never fails the pipeline; callers treat every variant as
/// "no pattern" and log the reason.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionFailure {
    #[error("quality {quality:.3} below extraction threshold {threshold}")]
    BelowThreshold { quality: f64, threshold: f64 },

    #[error("generation failed: {message}")]
    GenerationFailed { message: String },

    #[error("no JSON object found in extraction output")]
    NoJsonFound,

    #[error("invalid JSON: {message}")]
    InvalidJson { message: String },

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("malformed field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },
}

impl ExtractionFailure {
    /// Short machine-readable reason used in structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionFailure::BelowThreshold { .. } => "score_below_threshold",
            ExtractionFailure::GenerationFailed { .. } => "generation_failed",
            ExtractionFailure::NoJsonFound => "no_json_found",
            ExtractionFailure::InvalidJson { .. } => "invalid_json",
            ExtractionFailure::MissingField { .. } => "missing_field",
            ExtractionFailure::MalformedField { .. } => "malformed_field",
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for text-generation operations
pub type LlmResult<T> = Result<T, LlmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err: AppError = StorageError::PatternNotFound {
            pattern_id: "pattern_x".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "Storage error: Pattern not found: pattern_x");

        let err: AppError = LlmError::Timeout { timeout_ms: 500 }.into();
        assert!(matches!(err, AppError::Llm(LlmError::Timeout { timeout_ms: 500 })));
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(err.to_string(), "Database connection failed: failed to connect");

        let err = StorageError::PatternNotFound {
            pattern_id: "pattern_1a2b3c4d".to_string(),
        };
        assert_eq!(err.to_string(), "Pattern not found: pattern_1a2b3c4d");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "LLM unavailable: server down (retries: 3)");

        let err = LlmError::Api {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 503 - overloaded");

        let err = LlmError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_extraction_failure_reason() {
        assert_eq!(ExtractionFailure::NoJsonFound.reason(), "no_json_found");
        assert_eq!(
            ExtractionFailure::MissingField { field: "domain" }.reason(),
            "missing_field"
        );
        assert_eq!(
            ExtractionFailure::MissingField { field: "domain" }.to_string(),
            "missing required field: domain"
        );
        let below = ExtractionFailure::BelowThreshold {
            quality: 0.5,
            threshold: 0.8,
        };
        assert_eq!(below.reason(), "score_below_threshold");
        assert_eq!(below.to_string(), "quality 0.500 below extraction threshold 0.8");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::PatternNotFound {
            pattern_id: "p".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_llm_error_conversion_to_app_error() {
        let llm_err = LlmError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = llm_err.into();
        assert!(matches!(app_err, AppError::Llm(_)));
    }
}
