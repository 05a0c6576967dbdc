// Workflow session: owns the pipeline state and wires the classifier loader,
// the classify-and-translate pipeline, and the two nested recovery
// controllers together. The HTTP layer only ever talks to this type.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::core::config::Config;
use crate::core::errors::{PipelineError, TerminalCondition};
use crate::core::types::{ClassificationResult, FallbackView, SelectedImage, SessionSnapshot};
use crate::middleware::recovery::RecoveryController;
use crate::orchestration::pipeline::ClassifyTranslatePipeline;
use crate::services::classifier::{ClassifierLoader, ClassifierProvider};
use crate::services::translation::Translator;
use crate::utils::preview::{file_extension, preview_data_url};
use crate::utils::Metrics;

/// File extensions rejected as vector-image formats before any
/// classification or translation work is issued.
const VECTOR_IMAGE_EXTENSIONS: &[&str] = &["svg", "svgz"];

/// Whether a filename carries one of the rejected vector-image extensions.
pub fn is_vector_image(filename: &str) -> bool {
    file_extension(filename)
        .map(|extension| VECTOR_IMAGE_EXTENSIONS.contains(&extension.as_str()))
        .unwrap_or(false)
}

/// State owned exclusively by the session. `results` is only ever replaced
/// wholesale, never mutated in place, so the snapshot layer can never observe
/// a partial result set.
struct WorkflowStateInner {
    selected: Option<SelectedImage>,
    preview_url: Option<String>,
    results: Vec<ClassificationResult>,
}

impl WorkflowStateInner {
    fn empty() -> Self {
        Self {
            selected: None,
            preview_url: None,
            results: Vec::new(),
        }
    }
}

pub struct WorkflowSession {
    loader: Arc<ClassifierLoader>,
    provider: Arc<dyn ClassifierProvider>,
    pipeline: ClassifyTranslatePipeline,
    /// Page-level controller: recovers the input-selection subtree
    /// (unsupported file type). A page reset keeps the loaded classifier.
    page_recovery: RecoveryController,
    /// App-level controller: recovers the whole workflow (forbidden word).
    /// An app reset discards everything, including the classifier.
    app_recovery: RecoveryController,
    state: RwLock<WorkflowStateInner>,
    /// Bumped by every reset (page or app) and by every new selection. A
    /// pipeline run is stamped with the value current at issue time; a run
    /// whose stamp is stale on completion publishes nothing.
    run_generation: AtomicU64,
    running: AtomicBool,
    metrics: Metrics,
}

impl WorkflowSession {
    pub fn new(
        config: Arc<Config>,
        translator: Arc<dyn Translator>,
        provider: Arc<dyn ClassifierProvider>,
        metrics: Metrics,
    ) -> Self {
        Self {
            loader: Arc::new(ClassifierLoader::new()),
            provider,
            pipeline: ClassifyTranslatePipeline::new(translator, &config, Some(metrics.clone())),
            page_recovery: RecoveryController::new("page"),
            app_recovery: RecoveryController::new("app"),
            state: RwLock::new(WorkflowStateInner::empty()),
            run_generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
            metrics,
        }
    }

    /// Create the session and kick off the one-per-mount classifier load.
    pub fn mount(
        config: Arc<Config>,
        translator: Arc<dyn Translator>,
        provider: Arc<dyn ClassifierProvider>,
        metrics: Metrics,
    ) -> Arc<Self> {
        let session = Arc::new(Self::new(config, translator, provider, metrics));
        session.spawn_classifier_load();
        session
    }

    /// Background classifier load. Invoked on mount and after an app reset;
    /// never retried on its own.
    pub fn spawn_classifier_load(&self) {
        let loader = Arc::clone(&self.loader);
        let provider = Arc::clone(&self.provider);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            metrics.record_classifier_load();
            loader.load(provider.as_ref()).await;
        });
    }

    /// The condition currently blocking the workflow, if any. The app-level
    /// controller wraps the page-level one, so it wins.
    fn active_condition(&self) -> Option<TerminalCondition> {
        self.app_recovery
            .condition()
            .or_else(|| self.page_recovery.condition())
    }

    /// Accept a user-selected file, or trip the page controller if its
    /// extension names a vector-image format.
    ///
    /// On rejection, no classification or translation call is ever issued for
    /// the file and any prior selection is discarded.
    pub fn select_input(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<(), TerminalCondition> {
        if let Some(condition) = self.active_condition() {
            warn!(%condition, "Input selection refused while failed; reset required");
            return Err(condition);
        }

        if let Some(extension) = file_extension(filename) {
            if VECTOR_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
                // Discard any prior selection before raising, so a reset
                // starts from a clean slate. Any run still in flight for that
                // selection is invalidated with it.
                *self.state.write() = WorkflowStateInner::empty();
                self.run_generation.fetch_add(1, Ordering::SeqCst);
                self.metrics.record_input_rejection();

                let condition = TerminalCondition::UnsupportedInput { extension };
                self.page_recovery.trip(condition.clone());
                return Err(condition);
            }
        }

        let preview_url = preview_data_url(filename, &bytes);
        let mut state = self.state.write();
        state.selected = Some(SelectedImage {
            filename: filename.to_string(),
            image_bytes: Arc::new(bytes),
            width,
            height,
        });
        state.preview_url = Some(preview_url);
        // Changing the image invalidates previous predictions, and any run
        // still in flight for the previous image
        state.results.clear();
        self.run_generation.fetch_add(1, Ordering::SeqCst);

        info!(filename, width, height, "Input selected");
        Ok(())
    }

    /// Run the classify-and-translate pipeline against the current selection.
    ///
    /// Missing classifier or missing selection logs a warning and returns
    /// without side effects. A forbidden-word condition trips the app-level
    /// controller. Any other pipeline failure is logged and degrades to "no
    /// results". The running flag is cleared on every exit path.
    pub async fn classify_and_translate(&self) -> Result<(), TerminalCondition> {
        if let Some(condition) = self.active_condition() {
            warn!(%condition, "Classification refused while failed; reset required");
            return Err(condition);
        }

        let Some(classifier) = self.loader.classifier() else {
            warn!("Classifier not loaded yet; try again in a moment");
            return Ok(());
        };

        // Stamp the run before reading the selection; a reset or a new
        // selection while the run is in flight invalidates whatever it
        // produces
        let generation = self.run_generation.load(Ordering::SeqCst);
        let Some(image) = self.state.read().selected.clone() else {
            warn!("No image selected, nothing to classify");
            return Ok(());
        };

        self.running.store(true, Ordering::SeqCst);
        let started = Instant::now();
        let outcome = self.pipeline.run(classifier.as_ref(), &image).await;
        self.running.store(false, Ordering::SeqCst);
        self.metrics.record_pipeline_run(started.elapsed());

        if self.run_generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Discarding pipeline outcome from a stale generation");
            self.metrics.record_stale_discard();
            return Ok(());
        }

        match outcome {
            Ok(results) => {
                info!(results = results.len(), "Pipeline run complete");
                // Whole replace: the snapshot layer never sees a partial set
                self.state.write().results = results;
                Ok(())
            }
            Err(PipelineError::Terminal(condition)) => {
                self.metrics.record_forbidden_trip();
                self.app_recovery.trip(condition.clone());
                Err(condition)
            }
            Err(e) => {
                // Unexpected failure: degrade to no results, nothing escalated
                self.metrics.record_pipeline_failure();
                error!(error = %e, "Pipeline failed, returning to idle with no results");
                Ok(())
            }
        }
    }

    /// Page-level reset: clears selection, preview, and results and remounts
    /// the input subtree. The loaded classifier is retained.
    pub fn reset_page(&self) {
        self.page_recovery.reset();
        *self.state.write() = WorkflowStateInner::empty();
        self.run_generation.fetch_add(1, Ordering::SeqCst);
        self.metrics.record_reset("page");
    }

    /// App-level reset: remounts the whole workflow. Everything page-level
    /// owns is discarded too, and the classifier is reloaded from scratch.
    pub fn reset_app(&self) {
        self.app_recovery.reset();
        self.page_recovery.reset();
        *self.state.write() = WorkflowStateInner::empty();
        self.run_generation.fetch_add(1, Ordering::SeqCst);
        self.loader.unload();
        self.metrics.record_reset("app");
        self.spawn_classifier_load();
    }

    /// Atomic read of the whole workflow state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        let app_condition = self.app_recovery.condition();
        let page_condition = self.page_recovery.condition();

        let fallback = if let Some(condition) = app_condition.as_ref() {
            Some(FallbackView {
                scope: "app",
                message: condition.to_string(),
                forbidden_words: self.pipeline.forbidden_words().words().to_vec(),
            })
        } else {
            page_condition.as_ref().map(|condition| FallbackView {
                scope: "page",
                message: condition.to_string(),
                forbidden_words: Vec::new(),
            })
        };

        // An app-level failure hides the whole page, results included
        let results = if app_condition.is_some() {
            Vec::new()
        } else {
            state.results.clone()
        };

        SessionSnapshot {
            generation: self.app_recovery.generation(),
            classifier_loaded: self.loader.is_loaded(),
            is_classifier_loading: self.loader.is_loading(),
            is_pipeline_running: self.running.load(Ordering::SeqCst),
            selected_filename: state.selected.as_ref().map(|s| s.filename.clone()),
            preview_url: state.preview_url.clone(),
            results,
            has_failed: fallback.is_some(),
            fallback,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::*;
    use crate::core::errors::ClassifierResult;
    use crate::core::types::Prediction;
    use crate::services::classifier::Classifier;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn test_config(delay_ms: u64, forbidden: &[&str]) -> Arc<Config> {
        Arc::new(Config {
            server: ServerConfig {
                port: 1420,
                host: "127.0.0.1".into(),
                log_level: tracing::Level::INFO,
            },
            translation: TranslationConfig {
                api_key: None,
                endpoint: None,
                target_lang: "ES".into(),
                artificial_delay_ms: delay_ms,
                request_timeout_secs: 30,
            },
            classifier: ClassifierConfig {
                model_path: String::new(),
                labels_path: String::new(),
                top_k: 3,
                input_size: 224,
            },
            moderation: ModerationConfig {
                forbidden_words: forbidden.iter().map(|s| s.to_string()).collect(),
            },
        })
    }

    struct FixedClassifier {
        labels: Vec<&'static str>,
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, _image: &SelectedImage) -> ClassifierResult<Vec<Prediction>> {
            Ok(self
                .labels
                .iter()
                .map(|label| Prediction {
                    class_name: label.to_string(),
                    probability: 0.8,
                })
                .collect())
        }
    }

    struct FixedProvider {
        labels: Vec<&'static str>,
    }

    #[async_trait]
    impl ClassifierProvider for FixedProvider {
        async fn acquire(&self) -> ClassifierResult<Arc<dyn Classifier>> {
            Ok(Arc::new(FixedClassifier {
                labels: self.labels.clone(),
            }))
        }
    }

    /// Echo translator: returns the label unchanged, counting calls.
    struct EchoTranslator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(&self, text: &str, _target_lang: &str) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(text.to_string())
        }
    }

    async fn session_with(
        labels: Vec<&'static str>,
        forbidden: &[&str],
        delay_ms: u64,
    ) -> (Arc<WorkflowSession>, Arc<EchoTranslator>) {
        let translator = Arc::new(EchoTranslator {
            calls: AtomicUsize::new(0),
        });
        let provider = Arc::new(FixedProvider { labels });
        let session = Arc::new(WorkflowSession::new(
            test_config(delay_ms, forbidden),
            translator.clone(),
            provider.clone(),
            Metrics::new(),
        ));
        // Load inline instead of via spawn so tests are deterministic
        session.loader.load(provider.as_ref()).await;
        (session, translator)
    }

    #[tokio::test]
    async fn test_vector_image_rejected_before_any_pipeline_work() {
        let (session, translator) = session_with(vec!["dog"], &["cat"], 0).await;

        let err = session
            .select_input("diagram.svg", vec![1, 2, 3], 100, 100)
            .unwrap_err();
        assert_eq!(
            err,
            TerminalCondition::UnsupportedInput {
                extension: "svg".into()
            }
        );

        let snapshot = session.snapshot();
        assert!(snapshot.has_failed);
        assert_eq!(snapshot.fallback.as_ref().unwrap().scope, "page");
        assert!(snapshot.results.is_empty());
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);

        // Further requests are refused until the user resets
        let err = session.classify_and_translate().await.unwrap_err();
        assert!(matches!(err, TerminalCondition::UnsupportedInput { .. }));
    }

    #[tokio::test]
    async fn test_classify_without_selection_is_a_noop() {
        let (session, translator) = session_with(vec!["dog"], &["cat"], 0).await;

        session.classify_and_translate().await.unwrap();
        assert!(session.snapshot().results.is_empty());
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_classify_without_loaded_classifier_is_refused() {
        let translator = Arc::new(EchoTranslator {
            calls: AtomicUsize::new(0),
        });
        let provider = Arc::new(FixedProvider { labels: vec![] });
        let session = WorkflowSession::new(
            test_config(0, &["cat"]),
            translator.clone(),
            provider,
            Metrics::new(),
        );
        // Classifier never loaded
        session
            .select_input("dog.jpg", vec![1, 2, 3], 64, 64)
            .unwrap();

        session.classify_and_translate().await.unwrap();
        assert!(session.snapshot().results.is_empty());
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_happy_path_publishes_translated_results() {
        let (session, _) = session_with(vec!["dog", "bird"], &["cat"], 0).await;

        session
            .select_input("dog.jpg", vec![1, 2, 3], 64, 64)
            .unwrap();
        session.classify_and_translate().await.unwrap();

        let snapshot = session.snapshot();
        assert!(!snapshot.has_failed);
        assert_eq!(snapshot.results.len(), 2);
        assert_eq!(snapshot.results[0].class_name, "dog");
        assert_eq!(
            snapshot.results[0].translated_name.as_deref(),
            Some("(ES) dog")
        );
        assert_eq!(snapshot.selected_filename.as_deref(), Some("dog.jpg"));
        assert!(snapshot.preview_url.is_some());
    }

    #[tokio::test]
    async fn test_forbidden_word_trips_app_controller_with_zero_visible_results() {
        let (session, _) = session_with(vec!["black cat", "dog"], &["cat"], 0).await;

        session
            .select_input("cat.jpg", vec![1, 2, 3], 64, 64)
            .unwrap();
        let err = session.classify_and_translate().await.unwrap_err();
        assert!(matches!(err, TerminalCondition::ForbiddenWord { .. }));

        let snapshot = session.snapshot();
        assert!(snapshot.has_failed);
        let fallback = snapshot.fallback.unwrap();
        assert_eq!(fallback.scope, "app");
        assert_eq!(fallback.forbidden_words, vec!["cat".to_string()]);
        assert!(snapshot.results.is_empty());
    }

    #[tokio::test]
    async fn test_app_reset_clears_state_and_bumps_generation() {
        let (session, _) = session_with(vec!["black cat"], &["cat"], 0).await;

        session
            .select_input("cat.jpg", vec![1, 2, 3], 64, 64)
            .unwrap();
        let _ = session.classify_and_translate().await;
        assert!(session.snapshot().has_failed);

        session.reset_app();

        let snapshot = session.snapshot();
        assert!(!snapshot.has_failed);
        assert_eq!(snapshot.generation, 1);
        assert!(snapshot.selected_filename.is_none());
        assert!(snapshot.preview_url.is_none());
        assert!(snapshot.results.is_empty());
    }

    #[tokio::test]
    async fn test_page_reset_retains_classifier() {
        let (session, _) = session_with(vec!["dog"], &["cat"], 0).await;

        session
            .select_input("diagram.svgz", vec![1], 10, 10)
            .unwrap_err();
        assert!(session.snapshot().has_failed);

        session.reset_page();

        let snapshot = session.snapshot();
        assert!(!snapshot.has_failed);
        assert!(snapshot.classifier_loaded);
        assert!(snapshot.selected_filename.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_results_are_discarded_after_reset() {
        // 1s artificial delay keeps the run in flight while we reset
        let (session, _) = session_with(vec!["black cat"], &["cat"], 1000).await;

        session
            .select_input("cat.jpg", vec![1, 2, 3], 64, 64)
            .unwrap();

        let running = Arc::clone(&session);
        let task = tokio::spawn(async move { running.classify_and_translate().await });

        // Let the pipeline reach its artificial delay, then reset underneath it
        tokio::task::yield_now().await;
        session.reset_app();

        // The in-flight run is not cancelled; it completes and is discarded
        task.await.unwrap().unwrap();

        let snapshot = session.snapshot();
        assert!(!snapshot.has_failed, "stale forbidden word must not trip");
        assert!(snapshot.results.is_empty());
        assert_eq!(snapshot.generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_reset_discards_stale_in_flight_run() {
        let (session, _) = session_with(vec!["dog", "bird"], &["cat"], 1000).await;

        session
            .select_input("dog.jpg", vec![1, 2, 3], 64, 64)
            .unwrap();

        let running = Arc::clone(&session);
        let task = tokio::spawn(async move { running.classify_and_translate().await });

        tokio::task::yield_now().await;
        session.reset_page();

        task.await.unwrap().unwrap();

        // The run was issued before the reset; its results must not reappear
        let snapshot = session.snapshot();
        assert!(!snapshot.has_failed);
        assert!(snapshot.results.is_empty());
        assert!(snapshot.selected_filename.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_selection_discards_run_for_previous_image() {
        let (session, _) = session_with(vec!["dog", "bird"], &["cat"], 1000).await;

        session
            .select_input("first.jpg", vec![1, 2, 3], 64, 64)
            .unwrap();

        let running = Arc::clone(&session);
        let task = tokio::spawn(async move { running.classify_and_translate().await });

        // Pick a different image while the first run is still in flight
        tokio::task::yield_now().await;
        session
            .select_input("second.jpg", vec![4, 5, 6], 64, 64)
            .unwrap();

        task.await.unwrap().unwrap();

        // Results from the first image never land under the second selection
        let snapshot = session.snapshot();
        assert_eq!(snapshot.selected_filename.as_deref(), Some("second.jpg"));
        assert!(snapshot.results.is_empty());
    }
}
