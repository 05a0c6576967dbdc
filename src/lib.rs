// Library exports for the classify-and-translate workflow

// Core modules
pub mod core;
pub mod middleware;
pub mod orchestration;
pub mod services;
pub mod session;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{ClassifierError, ConfigError, PipelineError, TerminalCondition, TranslationError},
    types::{
        ClassificationResult, FallbackView, ForbiddenWordSet, Prediction, SelectedImage,
        SessionSnapshot, TranslationOutcome,
    },
};

pub use crate::middleware::{RecoveryController, RecoveryState, RecoveryStats};

pub use crate::orchestration::ClassifyTranslatePipeline;

pub use crate::services::{
    classifier::UnavailableClassifierProvider, Classifier, ClassifierLoader, ClassifierProvider,
    TranslationGateway, Translator,
};

pub use crate::session::WorkflowSession;

pub use crate::utils::Metrics;
