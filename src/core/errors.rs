// Custom error types for the classify-and-translate workflow
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation
// - Type-safe error matching
// - Automatic Display/Error trait implementations

use thiserror::Error;

/// Deliberate, user-facing terminal signals caught by a recovery controller.
///
/// These are control-flow values, not unexpected failures: the workflow raises
/// them on purpose and the only way out is an explicit user reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalCondition {
    #[error("unsupported input: .{extension} is a vector image format")]
    UnsupportedInput { extension: String },

    #[error("translation \"{translation}\" contains forbidden word \"{word}\"")]
    ForbiddenWord { word: String, translation: String },
}

/// Translation gateway errors (internal: the gateway degrades every one of
/// these to `None` before they reach a caller)
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation endpoint not configured (set TRANSLATE_ENDPOINT and TRANSLATE_API_KEY)")]
    NotConfigured,

    #[error("API request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("translation API returned status {0}")]
    BadStatus(reqwest::StatusCode),

    #[error("translation API returned no translations")]
    EmptyResponse,
}

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("no classifier backend compiled in (rebuild with --features onnx)")]
    BackendUnavailable,

    #[error("classifier load failed: {0}")]
    LoadFailed(String),

    #[error("image decoding failed: {0}")]
    InvalidImage(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

/// Pipeline orchestration errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The deliberate forbidden-word path; escalated to the recovery controller
    #[error(transparent)]
    Terminal(#[from] TerminalCondition),

    /// Unexpected classifier failure; logged and degraded to "no results"
    #[error("classification failed: {source}")]
    ClassificationFailed {
        #[source]
        source: ClassifierError,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target language must not be empty")]
    EmptyTargetLang,

    #[error("top_k must be > 0, got {0}")]
    InvalidTopK(usize),

    #[error("classifier input size must be between 32 and 1024, got {0}")]
    InvalidInputSize(u32),

    #[error("request timeout must be > 0 seconds")]
    InvalidTimeout,
}

// Convenience type aliases for Results
pub type TranslationResult<T> = Result<T, TranslationError>;
pub type ClassifierResult<T> = Result<T, ClassifierError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
