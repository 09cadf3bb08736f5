//! Land-cover classification on top of an inference backend.

use super::InferenceService;
use crate::error::{Error, Result};
use crate::preprocess::InputTensor;
use crate::utils::labels::read_labels;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Winning class of one classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Label from the vocabulary.
    pub label: String,
    /// Probability of the label.
    pub confidence: f32,
    /// Class index.
    pub index: usize,
}

impl std::fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {:.4}", self.label, self.confidence)
    }
}

/// Classifier decoding one named output of an inference backend.
#[derive(Debug)]
pub struct Classifier<S> {
    service: S,
    labels: Vec<String>,
    output_key: String,
}

impl<S: InferenceService> Classifier<S> {
    /// Classifier over `labels` reading the vector named `output_key`.
    pub fn new(service: S, labels: Vec<String>, output_key: impl Into<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::ClassifierBuild {
                reason: "label vocabulary is empty".to_string(),
            });
        }

        Ok(Self {
            service,
            labels,
            output_key: output_key.into(),
        })
    }

    /// Classifier with labels read from `labels_path`.
    pub fn with_labels_file(
        service: S,
        labels_path: &Path,
        output_key: impl Into<String>,
    ) -> Result<Self> {
        if !labels_path.exists() {
            return Err(Error::LabelsFileNotFound {
                path: labels_path.to_path_buf(),
            });
        }
        Self::new(service, read_labels(labels_path)?, output_key)
    }

    /// Label vocabulary in class index order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Run the model on `tensor` and decode the most likely class.
    pub fn classify(&self, tensor: &InputTensor) -> Result<PredictionResult> {
        let outputs = self.service.infer(tensor)?;
        self.decode(&outputs)
    }

    fn decode(&self, outputs: &HashMap<String, Vec<f32>>) -> Result<PredictionResult> {
        let shape_err = |actual| Error::UnexpectedOutputShape {
            key: self.output_key.clone(),
            expected: self.labels.len(),
            actual,
        };

        let vector = outputs
            .get(&self.output_key)
            .ok_or_else(|| shape_err(None))?;
        if vector.len() != self.labels.len() {
            return Err(shape_err(Some(vector.len())));
        }
        debug!("Class probabilities: {vector:?}");

        let (index, confidence) = argmax(vector).ok_or_else(|| Error::Inference {
            reason: "model produced no finite probabilities".to_string(),
        })?;

        Ok(PredictionResult {
            label: self.labels[index].clone(),
            confidence,
            index,
        })
    }
}

/// Index and value of the largest element; ties go to the lowest index.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best
}
