//! Classifier seams. The pipeline only sees these traits; the TFLite
//! backend and the test fakes implement them.

pub mod labels;
pub mod tflite;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::analyzer::AcousticDescriptor;
use crate::context::ContextVector;
pub use labels::EmotionLabels;
pub use tflite::TfliteModel;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model resource not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Inference runtime error: {0}")]
    Runtime(String),
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },
    #[error("Label set error: {0}")]
    Labels(String),
}

/// Acoustic descriptor in, one probability per emotion label out.
pub trait EmotionClassifier: Send + Sync {
    /// Descriptor length the model was trained on.
    fn input_width(&self) -> usize;
    fn predict(&self, descriptor: &AcousticDescriptor) -> Result<Vec<f32>, ModelError>;
}

/// Context vector in, one score per genre class index out.
pub trait GenreRecommender: Send + Sync {
    fn predict(&self, vector: &ContextVector) -> Result<Vec<f32>, ModelError>;
}

/// Arg-max of a classifier output, resolved against its label set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionResult {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

impl EmotionResult {
    pub fn from_probabilities(
        probabilities: Vec<f32>,
        labels: &EmotionLabels,
    ) -> Result<Self, ModelError> {
        if probabilities.len() != labels.len() {
            return Err(ModelError::Shape {
                expected: labels.len(),
                actual: probabilities.len(),
            });
        }
        let index = argmax(&probabilities).ok_or(ModelError::Shape { expected: 1, actual: 0 })?;
        let label = labels
            .get(index)
            .ok_or_else(|| ModelError::Labels(format!("no label at index {index}")))?
            .to_string();
        Ok(Self {
            index,
            label,
            confidence: probabilities[index],
            probabilities,
        })
    }

    /// Emotion half of a `gender_emotion` label.
    pub fn emotion(&self) -> &str {
        labels::split_gender(&self.label).1
    }

    pub fn gender(&self) -> &str {
        labels::split_gender(&self.label).0
    }
}

/// Index of the largest value; the lowest index wins ties. NaN never wins.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i).or(if values.is_empty() { None } else { Some(0) })
}
