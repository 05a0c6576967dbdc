// Core types for the classify-and-translate workflow

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single (label, confidence) pair from the classifier.
///
/// Ordering and count are determined by the classifier; typically
/// probability-descending top-K, but nothing here depends on that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub class_name: String,
    pub probability: f32,
}

/// A classified label with its translation attached.
///
/// `translated_name` is populated exactly once by the pipeline and the whole
/// result set is discarded on reset; results are never mutated in place after
/// publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub class_name: String,
    pub probability: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_name: Option<String>,
}

/// Outcome of a single translation call. Never partially populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    Translated(String),
    /// The gateway could not produce a translation; callers fall back to the
    /// original label text.
    Unavailable,
}

/// Read-only forbidden-word list, matched case-insensitively as substrings.
///
/// Injected from configuration and shared across concurrent translation checks
/// without synchronization.
#[derive(Debug, Clone)]
pub struct ForbiddenWordSet {
    words: Vec<String>,
}

impl ForbiddenWordSet {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        Self { words }
    }

    /// First forbidden word contained in `text`, if any.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.words
            .iter()
            .find(|word| lowered.contains(word.as_str()))
            .map(|w| w.as_str())
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// An image the user has selected for classification.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub filename: String,
    pub image_bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

/// Fallback view data rendered while a recovery controller is in Failed state.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackView {
    /// Which controller tripped ("page" or "app")
    pub scope: &'static str,
    pub message: String,
    pub forbidden_words: Vec<String>,
}

/// Point-in-time snapshot of the whole workflow state, for the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub classifier_loaded: bool,
    pub is_classifier_loading: bool,
    pub is_pipeline_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub results: Vec<ClassificationResult>,
    pub has_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackView>,
}
