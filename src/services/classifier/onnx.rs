// ONNX-backed image classifier (opt-in via the `onnx` cargo feature)
//
// Expects an ImageNet-style classification model plus a labels file with one
// class name per line.

use async_trait::async_trait;
use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::config::ClassifierConfig;
use crate::core::errors::{ClassifierError, ClassifierResult};
use crate::core::types::{Prediction, SelectedImage};
use crate::services::classifier::{Classifier, ClassifierProvider};

const CROP_PCT: f32 = 0.875;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

pub struct OnnxClassifier {
    session: Mutex<Session>,
    labels: Vec<String>,
    top_k: usize,
    input_size: u32,
}

impl OnnxClassifier {
    pub fn new(config: &ClassifierConfig) -> ClassifierResult<Self> {
        let labels = load_labels(Path::new(&config.labels_path))?;

        let session = Session::builder()
            .map_err(|e| ClassifierError::LoadFailed(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ClassifierError::LoadFailed(e.to_string()))?
            .commit_from_file(&config.model_path)
            .map_err(|e| ClassifierError::LoadFailed(e.to_string()))?;

        info!(
            model = %config.model_path,
            labels = labels.len(),
            "ONNX classifier session ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            top_k: config.top_k,
            input_size: config.input_size,
        })
    }

    fn preprocess(&self, image: &SelectedImage) -> ClassifierResult<Array4<f32>> {
        let img = image::load_from_memory(&image.image_bytes)
            .map_err(|e| ClassifierError::InvalidImage(e.to_string()))?;

        // Resize shortest edge to ceil(input_size / crop_pct), then center crop
        let crop_size = self.input_size;
        let resize_size = (crop_size as f32 / CROP_PCT).ceil() as u32;
        let (w, h) = (img.width(), img.height());
        let (new_w, new_h) = if w < h {
            (
                resize_size,
                ((h as f32 / w as f32) * resize_size as f32).round() as u32,
            )
        } else {
            (
                ((w as f32 / h as f32) * resize_size as f32).round() as u32,
                resize_size,
            )
        };
        let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);

        let crop_x = (new_w.saturating_sub(crop_size)) / 2;
        let crop_y = (new_h.saturating_sub(crop_size)) / 2;
        let rgb = resized.crop_imm(crop_x, crop_y, crop_size, crop_size).to_rgb8();

        // HWC u8 → normalized NCHW f32
        let hw = (crop_size * crop_size) as usize;
        let raw = rgb.into_raw();
        let mut data = vec![0f32; 3 * hw];
        for (i, pixel) in raw.chunks_exact(3).enumerate() {
            data[i] = (pixel[0] as f32 / 255.0 - MEAN[0]) / STD[0];
            data[hw + i] = (pixel[1] as f32 / 255.0 - MEAN[1]) / STD[1];
            data[2 * hw + i] = (pixel[2] as f32 / 255.0 - MEAN[2]) / STD[2];
        }

        Array4::from_shape_vec((1, 3, crop_size as usize, crop_size as usize), data)
            .map_err(|e| ClassifierError::InvalidImage(format!("tensor shape: {}", e)))
    }

    fn top_k_predictions(&self, logits: &[f32]) -> Vec<Prediction> {
        // Softmax over raw logits
        let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
        let probabilities: Vec<f32> = logits
            .iter()
            .map(|&x| (x - max_logit).exp() / exp_sum)
            .collect();

        let mut indexed: Vec<(usize, f32)> = probabilities.into_iter().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        indexed
            .into_iter()
            .take(self.top_k)
            .map(|(idx, probability)| Prediction {
                class_name: self
                    .labels
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", idx)),
                probability,
            })
            .collect()
    }
}

#[async_trait]
impl Classifier for OnnxClassifier {
    async fn classify(&self, image: &SelectedImage) -> ClassifierResult<Vec<Prediction>> {
        let tensor = self.preprocess(image)?;

        let input_tensor = Value::from_array(tensor)
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;

        let mut session = self.session.lock().await;
        let input_name = session.inputs()[0].name().to_string();
        let outputs = session
            .run(ort::inputs![input_name.as_str() => input_tensor])
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| ClassifierError::InferenceFailed("model produced no outputs".into()))?;

        let (_, logits) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(e.to_string()))?;

        let predictions = self.top_k_predictions(logits);
        debug!(
            filename = %image.filename,
            count = predictions.len(),
            "Classification complete"
        );
        Ok(predictions)
    }
}

/// Provider that builds the ONNX session off the async runtime.
pub struct OnnxClassifierProvider {
    config: ClassifierConfig,
}

impl OnnxClassifierProvider {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClassifierProvider for OnnxClassifierProvider {
    async fn acquire(&self) -> ClassifierResult<Arc<dyn Classifier>> {
        let config = self.config.clone();
        let classifier = tokio::task::spawn_blocking(move || OnnxClassifier::new(&config))
            .await
            .map_err(|e| ClassifierError::LoadFailed(format!("load task panicked: {}", e)))??;
        Ok(Arc::new(classifier))
    }
}

fn load_labels(path: &Path) -> ClassifierResult<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ClassifierError::LoadFailed(format!("labels file {}: {}", path.display(), e)))?;
    let labels: Vec<String> = contents
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if labels.is_empty() {
        return Err(ClassifierError::LoadFailed(format!(
            "labels file {} is empty",
            path.display()
        )));
    }
    Ok(labels)
}
