use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::ModelError;
use crate::genres::split_csv_row;

/// Output order of the batch emotion model.
pub const BATCH_LABELS: [&str; 8] = [
    "neutral", "calm", "happy", "sad", "angry", "fearful", "disgust", "surprised",
];

/// Ordered emotion label set; position `i` names output `i` of the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotionLabels {
    labels: Vec<String>,
}

impl EmotionLabels {
    pub fn batch() -> Self {
        Self::from_labels(BATCH_LABELS.iter().map(|s| s.to_string()).collect())
    }

    pub fn from_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Category order of a one-hot encoder fitted on the `labels` column of a
    /// features CSV: distinct values, sorted.
    pub fn from_features_csv(path: &Path) -> Result<Self, ModelError> {
        let file = File::open(path).map_err(|_| ModelError::NotFound(path.to_path_buf()))?;
        let labels = parse_label_column(BufReader::new(file))?;
        log::debug!("Loaded {} emotion labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

fn parse_label_column<R: BufRead>(reader: R) -> Result<EmotionLabels, ModelError> {
    let mut lines = reader.lines();
    let header = lines
        .next()
        .transpose()
        .map_err(|e| ModelError::Labels(e.to_string()))?
        .ok_or_else(|| ModelError::Labels("features file is empty".into()))?;
    let column = split_csv_row(&header)
        .iter()
        .position(|h| h.trim() == "labels")
        .ok_or_else(|| ModelError::Labels("no 'labels' column".into()))?;

    let mut distinct = BTreeSet::new();
    for line in lines {
        let line = line.map_err(|e| ModelError::Labels(e.to_string()))?;
        if let Some(value) = split_csv_row(&line).get(column) {
            let value = value.trim();
            if !value.is_empty() {
                distinct.insert(value.to_string());
            }
        }
    }
    if distinct.is_empty() {
        return Err(ModelError::Labels("'labels' column has no values".into()));
    }
    Ok(EmotionLabels::from_labels(distinct.into_iter().collect()))
}

/// `female_angry` → (`female`, `angry`). Labels without `_` have gender `unknown`.
pub fn split_gender(label: &str) -> (&str, &str) {
    label.split_once('_').unwrap_or(("unknown", label))
}
