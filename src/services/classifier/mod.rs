// Classifier boundary: the model is an opaque external collaborator behind a
// trait, acquired once per mounted session by the loader.

#[cfg(feature = "onnx")]
pub mod onnx;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

use crate::core::errors::{ClassifierError, ClassifierResult};
use crate::core::types::{Prediction, SelectedImage};

/// Opaque image classifier mapping an image to ranked (label, confidence)
/// pairs. Ordering and count are the classifier's business.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &SelectedImage) -> ClassifierResult<Vec<Prediction>>;
}

/// Acquires a classifier instance. Invoked once on session mount and again
/// after an app-level reset.
#[async_trait]
pub trait ClassifierProvider: Send + Sync {
    async fn acquire(&self) -> ClassifierResult<Arc<dyn Classifier>>;
}

/// Provider used when no classifier backend is compiled in. The load fails,
/// the loader slot stays empty, and classification requests are refused with
/// a warning rather than an error.
pub struct UnavailableClassifierProvider;

#[async_trait]
impl ClassifierProvider for UnavailableClassifierProvider {
    async fn acquire(&self) -> ClassifierResult<Arc<dyn Classifier>> {
        Err(ClassifierError::BackendUnavailable)
    }
}

/// Holds the session's classifier slot and its loading flag.
///
/// Load failures are logged and leave the slot empty; they are never
/// propagated. Callers must treat an empty slot as "not ready" and refuse
/// classification requests. There is no automatic retry: only an app-level
/// reset triggers a reload.
pub struct ClassifierLoader {
    slot: RwLock<Option<Arc<dyn Classifier>>>,
    loading: AtomicBool,
}

impl ClassifierLoader {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
            loading: AtomicBool::new(false),
        }
    }

    /// Acquire a classifier from `provider` and install it in the slot.
    ///
    /// The loading flag is true for the duration and false in all outcomes.
    pub async fn load(&self, provider: &dyn ClassifierProvider) {
        self.loading.store(true, Ordering::SeqCst);
        info!("Loading classifier...");

        match provider.acquire().await {
            Ok(classifier) => {
                *self.slot.write() = Some(classifier);
                info!("Classifier loaded");
            }
            Err(e) => {
                // Slot stays empty; downstream calls are refused, not failed
                error!(error = %e, "Classifier load failed");
            }
        }

        self.loading.store(false, Ordering::SeqCst);
    }

    pub fn classifier(&self) -> Option<Arc<dyn Classifier>> {
        self.slot.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Drop the current classifier (app-level reset remounts and reloads).
    pub fn unload(&self) {
        *self.slot.write() = None;
    }
}

impl Default for ClassifierLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClassifier;

    #[async_trait]
    impl Classifier for StubClassifier {
        async fn classify(&self, _image: &SelectedImage) -> ClassifierResult<Vec<Prediction>> {
            Ok(Vec::new())
        }
    }

    struct StubProvider;

    #[async_trait]
    impl ClassifierProvider for StubProvider {
        async fn acquire(&self) -> ClassifierResult<Arc<dyn Classifier>> {
            Ok(Arc::new(StubClassifier))
        }
    }

    #[tokio::test]
    async fn test_successful_load_fills_slot() {
        let loader = ClassifierLoader::new();
        assert!(!loader.is_loaded());

        loader.load(&StubProvider).await;
        assert!(loader.is_loaded());
        assert!(!loader.is_loading());
        assert!(loader.classifier().is_some());
    }

    #[tokio::test]
    async fn test_failed_load_leaves_slot_empty_and_clears_flag() {
        let loader = ClassifierLoader::new();
        loader.load(&UnavailableClassifierProvider).await;

        assert!(!loader.is_loaded());
        assert!(!loader.is_loading());
        assert!(loader.classifier().is_none());
    }

    #[tokio::test]
    async fn test_unload_empties_slot() {
        let loader = ClassifierLoader::new();
        loader.load(&StubProvider).await;
        loader.unload();
        assert!(!loader.is_loaded());
    }
}
