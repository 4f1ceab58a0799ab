//! End-to-end request flow: audio → emotion → context vector → ranked genres.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;

use crate::analyzer::{FeatureError, FeatureExtractor};
use crate::context::{ContextEncoder, ContextVector, UserContext};
use crate::genres::GenreLabelTable;
use crate::ingest::{AudioIngestor, IngestError};
use crate::model::{EmotionClassifier, EmotionLabels, EmotionResult, GenreRecommender, ModelError};
use crate::weather::{WeatherReport, WeatherSource};

pub const TOP_K: usize = 3;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("Feature extraction failed: {0}")]
    Features(#[from] FeatureError),
    #[error("Inference failed: {0}")]
    Model(#[from] ModelError),
}

/// Indices of the `k` highest scores, best first. Equal scores keep
/// ascending index order; NaN sorts last.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (scores[a], scores[b]);
        let by_score = match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        };
        by_score.then(a.cmp(&b))
    });
    order.truncate(k);
    order
}

/// Ingest → MFCC → emotion classifier.
pub struct EmotionPipeline {
    ingestor: AudioIngestor,
    extractor: FeatureExtractor,
    classifier: Arc<dyn EmotionClassifier>,
    labels: EmotionLabels,
}

impl EmotionPipeline {
    /// Fails if the descriptor width does not match what the classifier was trained on.
    pub fn new(
        ingestor: AudioIngestor,
        extractor: FeatureExtractor,
        classifier: Arc<dyn EmotionClassifier>,
        labels: EmotionLabels,
    ) -> Result<Self, ModelError> {
        if classifier.input_width() != extractor.width() {
            return Err(ModelError::Shape {
                expected: classifier.input_width(),
                actual: extractor.width(),
            });
        }
        if labels.is_empty() {
            return Err(ModelError::Labels("emotion label set is empty".into()));
        }
        Ok(Self {
            ingestor,
            extractor,
            classifier,
            labels,
        })
    }

    pub fn detect(&self, audio: &Path) -> Result<EmotionResult, PipelineError> {
        let waveform = self.ingestor.ingest(audio)?;
        let descriptor = self.extractor.extract(&waveform)?;
        let probabilities = self.classifier.predict(&descriptor)?;
        let result = EmotionResult::from_probabilities(probabilities, &self.labels)?;
        log::info!(
            "Detected emotion '{}' ({:.1}%)",
            result.label,
            result.confidence * 100.0
        );
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedGenre {
    pub index: usize,
    pub name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub emotion: EmotionResult,
    pub weather: WeatherReport,
    pub context: ContextVector,
    pub genres: Vec<RankedGenre>,
}

impl Recommendation {
    pub fn genre_names(&self) -> Vec<&str> {
        self.genres.iter().map(|g| g.name.as_str()).collect()
    }
}

/// The batch flow. Built once; each call is one independent request.
pub struct Recommender {
    emotion: EmotionPipeline,
    genre_model: Box<dyn GenreRecommender>,
    encoder: ContextEncoder,
    genres: GenreLabelTable,
    weather: Box<dyn WeatherSource>,
}

impl Recommender {
    pub fn new(
        emotion: EmotionPipeline,
        genre_model: Box<dyn GenreRecommender>,
        encoder: ContextEncoder,
        genres: GenreLabelTable,
        weather: Box<dyn WeatherSource>,
    ) -> Self {
        Self {
            emotion,
            genre_model,
            encoder,
            genres,
            weather,
        }
    }

    pub fn recommend(
        &self,
        audio: &Path,
        city: &str,
        user: &UserContext,
        now: NaiveDateTime,
    ) -> Result<Recommendation, PipelineError> {
        let emotion = self.emotion.detect(audio)?;
        let weather = self.weather.resolve(city);
        let context = self
            .encoder
            .encode(now, weather.code, user, emotion.emotion());
        log::debug!(
            "Context vector: {}",
            context
                .columns()
                .map(|(column, value)| format!("{column}={value}"))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let scores = self.genre_model.predict(&context)?;
        let genres = top_k(&scores, TOP_K)
            .into_iter()
            .map(|index| RankedGenre {
                index,
                name: self.genres.resolve(index),
                score: scores[index],
            })
            .collect();

        Ok(Recommendation {
            emotion,
            weather,
            context,
            genres,
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::analyzer::AcousticDescriptor;

    /// Always returns the same distribution.
    pub struct FixedEmotion {
        pub width: usize,
        pub probabilities: Vec<f32>,
    }

    impl EmotionClassifier for FixedEmotion {
        fn input_width(&self) -> usize {
            self.width
        }

        fn predict(&self, descriptor: &AcousticDescriptor) -> Result<Vec<f32>, ModelError> {
            assert_eq!(descriptor.len(), self.width);
            Ok(self.probabilities.clone())
        }
    }

    pub struct FixedGenres(pub Vec<f32>);

    impl GenreRecommender for FixedGenres {
        fn predict(&self, _vector: &ContextVector) -> Result<Vec<f32>, ModelError> {
            Ok(self.0.clone())
        }
    }

    pub struct BrokenGenres;

    impl GenreRecommender for BrokenGenres {
        fn predict(&self, _vector: &ContextVector) -> Result<Vec<f32>, ModelError> {
            Err(ModelError::Runtime("interpreter invoke failed".into()))
        }
    }
}
