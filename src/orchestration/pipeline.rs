// Classify-and-translate pipeline: classification, then one concurrent
// translation task per label, joined in input order.

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::core::config::Config;
use crate::core::errors::{PipelineError, PipelineResult, TerminalCondition};
use crate::core::types::{ClassificationResult, ForbiddenWordSet, SelectedImage, TranslationOutcome};
use crate::services::classifier::Classifier;
use crate::services::translation::Translator;
use crate::utils::Metrics;

/// The workflow's classification + translation stage.
///
/// One instance per session; stateless between runs. All run state lives on
/// the stack of `run`, so a discarded run leaves nothing behind.
pub struct ClassifyTranslatePipeline {
    translator: Arc<dyn Translator>,
    forbidden_words: Arc<ForbiddenWordSet>,
    target_lang: String,
    /// Fixed artificial delay before each translation call (simulated
    /// network/model latency, 1s by default)
    artificial_delay: Duration,
    metrics: Option<Metrics>,
}

impl ClassifyTranslatePipeline {
    pub fn new(
        translator: Arc<dyn Translator>,
        config: &Config,
        metrics: Option<Metrics>,
    ) -> Self {
        Self {
            translator,
            forbidden_words: Arc::new(ForbiddenWordSet::new(config.forbidden_words())),
            target_lang: config.target_lang().to_string(),
            artificial_delay: Duration::from_millis(config.translation.artificial_delay_ms),
            metrics,
        }
    }

    pub fn forbidden_words(&self) -> &ForbiddenWordSet {
        &self.forbidden_words
    }

    /// Run the full classify → fan-out translate → fan-in sequence.
    ///
    /// The aggregated results preserve the classifier's label order no matter
    /// in which order the concurrent translations complete, and no partial
    /// result set is ever returned: the join waits for every task.
    ///
    /// A forbidden word in any translation sets a run-wide failure flag but
    /// does NOT cancel sibling translations; they complete, and the run then
    /// yields the terminal condition instead of results. Fire-and-continue is
    /// the contract here, not early cancellation.
    #[instrument(skip(self, classifier, image), fields(filename = %image.filename))]
    pub async fn run(
        &self,
        classifier: &dyn Classifier,
        image: &SelectedImage,
    ) -> PipelineResult<Vec<ClassificationResult>> {
        let predictions = classifier
            .classify(image)
            .await
            .map_err(|source| PipelineError::ClassificationFailed { source })?;

        info!(labels = predictions.len(), "Classification produced labels");
        if predictions.is_empty() {
            return Ok(Vec::new());
        }

        // First forbidden match across all tasks; checked only after the join
        let failure: Mutex<Option<TerminalCondition>> = Mutex::new(None);

        // Fan out one translation task per label, FIFO issue order
        let tasks = predictions.into_iter().map(|prediction| {
            let failure = &failure;
            async move {
                let translated_name = self.translate_label(&prediction.class_name).await;

                if let Some(word) = self.forbidden_words.first_match(&translated_name) {
                    let mut slot = failure.lock();
                    if slot.is_none() {
                        *slot = Some(TerminalCondition::ForbiddenWord {
                            word: word.to_string(),
                            translation: translated_name.clone(),
                        });
                    }
                    // Siblings keep running; the join below still waits for them
                }

                ClassificationResult {
                    class_name: prediction.class_name,
                    probability: prediction.probability,
                    translated_name: Some(translated_name),
                }
            }
        });

        // Fan-in: join_all preserves input order regardless of completion order
        let results = join_all(tasks).await;

        if let Some(condition) = failure.lock().take() {
            warn!(condition = %condition, "Forbidden word detected, discarding run");
            return Err(PipelineError::Terminal(condition));
        }

        Ok(results)
    }

    /// Translate a single label, falling back to the original text when the
    /// gateway has nothing. Both paths carry the target-language tag prefix.
    async fn translate_label(&self, label: &str) -> String {
        tokio::time::sleep(self.artificial_delay).await;

        let outcome = match self.translator.translate(label, &self.target_lang).await {
            Some(text) => TranslationOutcome::Translated(text),
            None => TranslationOutcome::Unavailable,
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_translation(outcome != TranslationOutcome::Unavailable);
        }

        match outcome {
            TranslationOutcome::Translated(text) => {
                debug!(label, translation = %text, "Label translated");
                format!("({}) {}", self.target_lang, text)
            }
            TranslationOutcome::Unavailable => {
                info!(label, "Translation unavailable, using original label");
                format!("({}) {}", self.target_lang, label)
            }
        }
    }
}
