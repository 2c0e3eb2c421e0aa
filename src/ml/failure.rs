use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use tracing::info;

use crate::config::FailureConfig;
use crate::error::{EngineError, Result};
use crate::ml::models::{ModelMetrics, TrainingDataset};
use crate::models::{FailurePrediction, TimeToFailure};

type TreeModel = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

struct BaggedTree {
    model: TreeModel,

    /// Mean hours-to-failure across the failure rows in this tree's bootstrap
    mean_ttf: Option<f64>,
}

/// A bagged ensemble of decision trees predicting failure within the horizon
///
/// Probability is the fraction of trees voting failure. Confidence is the
/// share of trees agreeing with the majority vote.
pub struct FailurePredictor {
    trees: Vec<BaggedTree>,
    n_features: usize,
    ttf_report_threshold: f64,
    metrics: ModelMetrics,
}

impl FailurePredictor {
    /// Train the ensemble deterministically from a base seed
    pub fn train(dataset: &TrainingDataset, config: &FailureConfig, seed: u64) -> Result<Self> {
        if dataset.n_samples == 0 {
            return Err(EngineError::InsufficientData(
                "Cannot train failure predictor on an empty dataset".to_string(),
            ));
        }
        if dataset.failure_count() == 0 {
            return Err(EngineError::InsufficientData(
                "Training dataset has no failure examples".to_string(),
            ));
        }

        let trees: Vec<BaggedTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                // Per-tree seed derived from the base seed keeps bootstraps
                // reproducible regardless of thread scheduling
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                Self::fit_tree(dataset, config, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut predictor = Self {
            trees,
            n_features: dataset.n_features,
            ttf_report_threshold: config.ttf_report_threshold,
            metrics: ModelMetrics::new(),
        };

        let predictions: Vec<bool> = dataset
            .features
            .rows()
            .into_iter()
            .map(|row| {
                let p = predictor.predict(&row.to_vec())?;
                Ok(p.probability >= 0.5)
            })
            .collect::<Result<Vec<_>>>()?;
        predictor.metrics = ModelMetrics::from_predictions(&dataset.labels, &predictions);

        info!(
            n_trees = config.n_trees,
            n_samples = dataset.n_samples,
            n_failures = dataset.failure_count(),
            accuracy = predictor.metrics.accuracy,
            "Trained failure predictor"
        );

        Ok(predictor)
    }

    fn fit_tree(
        dataset: &TrainingDataset,
        config: &FailureConfig,
        rng: &mut StdRng,
    ) -> Result<BaggedTree> {
        let n = dataset.n_samples;
        let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

        let mut flat = Vec::with_capacity(n * dataset.n_features);
        let mut labels = Vec::with_capacity(n);
        let mut ttf_sum = 0.0;
        let mut ttf_count = 0usize;
        for &row in &bootstrap {
            flat.extend(dataset.features.row(row).iter().copied());
            labels.push(dataset.labels[row] as i32);
            if let Some(hours) = dataset.hours_to_failure[row] {
                ttf_sum += hours;
                ttf_count += 1;
            }
        }

        let x = DenseMatrix::new(n, dataset.n_features, flat, false);
        let params = DecisionTreeClassifierParameters::default()
            .with_max_depth(config.max_depth)
            .with_criterion(SplitCriterion::Gini);

        let model = DecisionTreeClassifier::fit(&x, &labels, params)
            .map_err(|e| EngineError::Internal(format!("Failed to fit bagged tree: {}", e)))?;

        let mean_ttf = (ttf_count > 0).then(|| ttf_sum / ttf_count as f64);
        Ok(BaggedTree { model, mean_ttf })
    }

    /// Predict failure probability for one feature vector
    ///
    /// The time-to-failure estimate is the mean observed TTF of the trees
    /// that voted failure, reported only above the probability threshold.
    pub fn predict(&self, features: &[f64]) -> Result<FailurePrediction> {
        if features.len() != self.n_features {
            return Err(EngineError::Validation(format!(
                "Point has {} features, predictor expects {}",
                features.len(),
                self.n_features
            )));
        }

        let x = DenseMatrix::new(1, features.len(), features.to_vec(), false);
        let mut failure_votes = 0usize;
        let mut ttf_sum = 0.0;
        let mut ttf_count = 0usize;

        for tree in &self.trees {
            let vote = tree
                .model
                .predict(&x)
                .map_err(|e| EngineError::Internal(format!("Tree prediction failed: {}", e)))?[0];
            if vote == 1 {
                failure_votes += 1;
                if let Some(ttf) = tree.mean_ttf {
                    ttf_sum += ttf;
                    ttf_count += 1;
                }
            }
        }

        let n_trees = self.trees.len() as f64;
        let probability = failure_votes as f64 / n_trees;
        let confidence = probability.max(1.0 - probability);

        let time_to_failure = (probability >= self.ttf_report_threshold && ttf_count > 0).then(
            || TimeToFailure {
                hours: ttf_sum / ttf_count as f64,
            },
        );

        Ok(FailurePrediction {
            probability,
            confidence,
            time_to_failure,
        })
    }

    pub fn metrics(&self) -> &ModelMetrics {
        &self.metrics
    }

    /// Training-set accuracy of the ensemble
    #[cfg(test)]
    fn training_accuracy(&self) -> f64 {
        self.metrics.accuracy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::TrainingExample;

    fn separable_dataset(n: usize) -> TrainingDataset {
        // Healthy points cluster low, failure points cluster high
        let examples: Vec<TrainingExample> = (0..n)
            .map(|i| {
                let jitter = (i % 5) as f64 * 0.1;
                if i % 2 == 0 {
                    TrainingExample::healthy(vec![1.0 + jitter, 2.0 - jitter])
                } else {
                    TrainingExample::failed(vec![9.0 + jitter, 8.0 - jitter], 36.0 + jitter)
                }
            })
            .collect();
        TrainingDataset::from_examples(&examples, vec!["a".to_string(), "b".to_string()]).unwrap()
    }

    fn config() -> FailureConfig {
        FailureConfig {
            n_trees: 30,
            max_depth: 5,
            ttf_report_threshold: 0.5,
        }
    }

    #[test]
    fn test_separable_classes_are_learned() {
        let dataset = separable_dataset(120);
        let predictor = FailurePredictor::train(&dataset, &config(), 42).unwrap();

        let healthy = predictor.predict(&[1.0, 2.0]).unwrap();
        let failing = predictor.predict(&[9.0, 8.0]).unwrap();

        assert!(healthy.probability < 0.5);
        assert!(failing.probability > 0.5);
        assert!(predictor.training_accuracy() > 0.9);
    }

    #[test]
    fn test_ttf_reported_only_above_threshold() {
        let dataset = separable_dataset(120);
        let predictor = FailurePredictor::train(&dataset, &config(), 42).unwrap();

        let failing = predictor.predict(&[9.0, 8.0]).unwrap();
        assert!(failing.time_to_failure.is_some());
        let ttf = failing.time_to_failure.unwrap();
        assert!(ttf.hours > 30.0 && ttf.hours < 42.0);

        let healthy = predictor.predict(&[1.0, 2.0]).unwrap();
        assert!(healthy.time_to_failure.is_none());
    }

    #[test]
    fn test_confidence_reflects_agreement() {
        let dataset = separable_dataset(120);
        let predictor = FailurePredictor::train(&dataset, &config(), 42).unwrap();

        let clear = predictor.predict(&[9.0, 8.0]).unwrap();
        assert!(clear.confidence > 0.9);
        assert!(clear.confidence >= clear.probability.max(1.0 - clear.probability) - 1e-9);
    }

    #[test]
    fn test_training_is_deterministic_for_a_seed() {
        let dataset = separable_dataset(100);
        let a = FailurePredictor::train(&dataset, &config(), 7).unwrap();
        let b = FailurePredictor::train(&dataset, &config(), 7).unwrap();

        let point = [5.0, 5.0];
        assert_eq!(
            a.predict(&point).unwrap().probability,
            b.predict(&point).unwrap().probability
        );
    }

    #[test]
    fn test_requires_failure_examples() {
        let examples: Vec<TrainingExample> = (0..50)
            .map(|i| TrainingExample::healthy(vec![i as f64, 1.0]))
            .collect();
        let dataset =
            TrainingDataset::from_examples(&examples, vec!["a".to_string(), "b".to_string()])
                .unwrap();
        let result = FailurePredictor::train(&dataset, &config(), 42);
        assert!(matches!(result, Err(EngineError::InsufficientData(_))));
    }

    #[test]
    fn test_rejects_wrong_dimensionality() {
        let dataset = separable_dataset(60);
        let predictor = FailurePredictor::train(&dataset, &config(), 42).unwrap();
        assert!(predictor.predict(&[1.0]).is_err());
    }
}
