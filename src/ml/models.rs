use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::models::EquipmentType;

/// One labeled training example
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Feature values, in schema order
    pub features: Vec<f64>,

    /// True when a corrective maintenance visit followed within the label horizon
    pub failed: bool,

    /// Hours between the observation and the corrective visit, for failed examples
    pub hours_to_failure: Option<f64>,
}

impl TrainingExample {
    pub fn healthy(features: Vec<f64>) -> Self {
        Self {
            features,
            failed: false,
            hours_to_failure: None,
        }
    }

    pub fn failed(features: Vec<f64>, hours_to_failure: f64) -> Self {
        Self {
            features,
            failed: true,
            hours_to_failure: Some(hours_to_failure),
        }
    }
}

/// A materialized training dataset for one equipment type
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix, one row per example
    pub features: Array2<f64>,

    /// Failure labels, aligned with the rows
    pub labels: Vec<bool>,

    /// Hours to failure for labeled rows, aligned with the rows
    pub hours_to_failure: Vec<Option<f64>>,

    /// Feature names, in column order
    pub feature_names: Vec<String>,

    pub n_samples: usize,
    pub n_features: usize,
}

impl TrainingDataset {
    pub fn from_examples(
        examples: &[TrainingExample],
        feature_names: Vec<String>,
    ) -> Result<Self> {
        if examples.is_empty() {
            return Err(EngineError::InsufficientData(
                "Training dataset has no examples".to_string(),
            ));
        }

        let n_samples = examples.len();
        let n_features = feature_names.len();

        for example in examples {
            if example.features.len() != n_features {
                return Err(EngineError::Validation(format!(
                    "Training example has {} features, schema expects {}",
                    example.features.len(),
                    n_features
                )));
            }
        }

        let flat: Vec<f64> = examples
            .iter()
            .flat_map(|e| e.features.iter().copied())
            .collect();
        let features = Array2::from_shape_vec((n_samples, n_features), flat)
            .map_err(|e| EngineError::Internal(format!("Failed to build feature matrix: {}", e)))?;

        Ok(Self {
            features,
            labels: examples.iter().map(|e| e.failed).collect(),
            hours_to_failure: examples.iter().map(|e| e.hours_to_failure).collect(),
            feature_names,
            n_samples,
            n_features,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l).count()
    }

    /// Rows from healthy snapshots only
    ///
    /// Anomaly training fits on normal operation; pre-failure snapshots
    /// would teach the forest to treat the failure signature as typical.
    pub fn normal_features(&self) -> Array2<f64> {
        let rows: Vec<usize> = self
            .labels
            .iter()
            .enumerate()
            .filter(|(_, &failed)| !failed)
            .map(|(i, _)| i)
            .collect();
        self.features.select(Axis(0), &rows)
    }
}

/// Quality metrics captured after a training run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute binary classification metrics from aligned label/prediction slices
    pub fn from_predictions(y_true: &[bool], y_pred: &[bool]) -> Self {
        let n = y_true.len();
        if n == 0 {
            return Self::new();
        }

        let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
        let tp = y_true.iter().zip(y_pred).filter(|(t, p)| **t && **p).count();
        let fp = y_true.iter().zip(y_pred).filter(|(t, p)| !**t && **p).count();
        let fn_count = y_true.iter().zip(y_pred).filter(|(t, p)| **t && !**p).count();

        let accuracy = correct as f64 / n as f64;
        let precision = if tp + fp > 0 {
            tp as f64 / (tp + fp) as f64
        } else {
            0.0
        };
        let recall = if tp + fn_count > 0 {
            tp as f64 / (tp + fn_count) as f64
        } else {
            0.0
        };
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            accuracy,
            precision,
            recall,
            f1_score,
        }
    }
}

/// Percentile bounds used to map raw anomaly scores into [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreNormalization {
    pub p01: f64,
    pub p99: f64,
}

impl ScoreNormalization {
    /// Derive bounds from the raw scores observed on the training set
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self { p01: 0.0, p99: 1.0 };
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let pick = |q: f64| {
            let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
            sorted[idx]
        };
        let p01 = pick(0.01);
        let p99 = pick(0.99);
        Self { p01, p99 }
    }

    /// Map a raw score into [0, 1], clamped
    pub fn normalize(&self, raw: f64) -> f64 {
        let span = self.p99 - self.p01;
        if span <= f64::EPSILON {
            return 0.5;
        }
        ((raw - self.p01) / span).clamp(0.0, 1.0)
    }
}

/// Metadata captured for every trained model set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub equipment_type: EquipmentType,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    pub n_training_samples: usize,
    pub n_failure_samples: usize,
    pub n_features: usize,
    pub feature_names: Vec<String>,
    pub metrics: ModelMetrics,
    pub hyperparameters: HashMap<String, String>,
}

/// The persisted form of a trained model set
///
/// Fitted trees are not serialized; the artifact carries the seed and
/// dataset fingerprint needed to rebuild them deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub normalization: ScoreNormalization,

    /// SHA-256 over the training feature matrix, row-major
    pub dataset_checksum: String,
}

impl ModelArtifact {
    pub fn checksum_of(dataset: &TrainingDataset) -> String {
        let mut hasher = Sha256::new();
        for value in dataset.features.iter() {
            hasher.update(value.to_le_bytes());
        }
        for label in &dataset.labels {
            hasher.update([*label as u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}
