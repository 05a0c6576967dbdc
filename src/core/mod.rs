pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{
    ClassifierError, ConfigError, PipelineError, TerminalCondition, TranslationError,
};
pub use types::{
    ClassificationResult, FallbackView, ForbiddenWordSet, Prediction, SelectedImage,
    SessionSnapshot, TranslationOutcome,
};
