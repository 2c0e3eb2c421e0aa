use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::info;

use crate::config::AnomalyConfig;
use crate::error::{EngineError, Result};
use crate::ml::models::ScoreNormalization;
use crate::models::AnomalyAssessment;

const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

/// Average unsuccessful-search path length in a binary search tree of n nodes
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn fit(data: &Array2<f64>, sample: &[usize], height_limit: usize, rng: &mut StdRng) -> Self {
        Self {
            root: Self::build(data, sample, 0, height_limit, rng),
        }
    }

    fn build(
        data: &Array2<f64>,
        sample: &[usize],
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> Node {
        if sample.len() <= 1 || depth >= height_limit {
            return Node::Leaf { size: sample.len() };
        }

        let n_features = data.ncols();
        // Pick a feature with spread; give up after a bounded number of draws
        let mut chosen = None;
        for _ in 0..n_features.max(8) {
            let feature = rng.gen_range(0..n_features);
            let (min, max) = Self::column_range(data, sample, feature);
            if max - min > f64::EPSILON {
                chosen = Some((feature, min, max));
                break;
            }
        }
        let Some((feature, min, max)) = chosen else {
            return Node::Leaf { size: sample.len() };
        };

        let split = rng.gen_range(min..max);
        let (left, right): (Vec<usize>, Vec<usize>) = sample
            .iter()
            .copied()
            .partition(|&row| data[[row, feature]] < split);

        if left.is_empty() || right.is_empty() {
            return Node::Leaf { size: sample.len() };
        }

        Node::Internal {
            feature,
            split,
            left: Box::new(Self::build(data, &left, depth + 1, height_limit, rng)),
            right: Box::new(Self::build(data, &right, depth + 1, height_limit, rng)),
        }
    }

    fn column_range(data: &Array2<f64>, sample: &[usize], feature: usize) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &row in sample {
            let v = data[[row, feature]];
            min = min.min(v);
            max = max.max(v);
        }
        (min, max)
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    node = if point[*feature] < *split { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// An isolation forest fitted over subsamples of the training matrix
///
/// Raw scores follow s(x) = 2^(-E[h(x)] / c(psi)) where psi is the
/// subsample size; higher means more isolated.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample_size: usize,
    n_features: usize,
}

impl IsolationForest {
    /// Fit the forest deterministically from a base seed
    pub fn fit(data: &Array2<f64>, config: &AnomalyConfig, seed: u64) -> Result<Self> {
        let n_samples = data.nrows();
        if n_samples == 0 {
            return Err(EngineError::InsufficientData(
                "Cannot fit isolation forest on an empty matrix".to_string(),
            ));
        }

        let subsample_size = config.subsample_size.min(n_samples);
        let height_limit = (subsample_size as f64).log2().ceil() as usize;

        let trees: Vec<IsolationTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|i| {
                // Per-tree seed derived from the base seed keeps fits reproducible
                // regardless of thread scheduling
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let sample = Self::subsample(n_samples, subsample_size, &mut rng);
                IsolationTree::fit(data, &sample, height_limit, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            subsample_size,
            n_features: data.ncols(),
        })
    }

    fn subsample(n_samples: usize, subsample_size: usize, rng: &mut StdRng) -> Vec<usize> {
        if subsample_size >= n_samples {
            return (0..n_samples).collect();
        }
        // Partial Fisher-Yates over row indices
        let mut indices: Vec<usize> = (0..n_samples).collect();
        for i in 0..subsample_size {
            let j = rng.gen_range(i..n_samples);
            indices.swap(i, j);
        }
        indices.truncate(subsample_size);
        indices
    }

    /// Raw anomaly score for one point, in (0, 1)
    pub fn raw_score(&self, point: &[f64]) -> Result<f64> {
        if point.len() != self.n_features {
            return Err(EngineError::Validation(format!(
                "Point has {} features, forest expects {}",
                point.len(),
                self.n_features
            )));
        }
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| t.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        Ok(2f64.powf(-mean_path / average_path_length(self.subsample_size)))
    }

    /// Raw scores for every row of a matrix
    pub fn raw_scores(&self, data: &Array2<f64>) -> Result<Vec<f64>> {
        data.rows()
            .into_iter()
            .map(|row| self.raw_score(&row.to_vec()))
            .collect()
    }
}

/// The anomaly detector: a fitted forest plus its score normalization
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    forest: IsolationForest,
    normalization: ScoreNormalization,
    threshold: f64,
}

impl AnomalyDetector {
    /// Fit the forest and derive normalization bounds from the training scores
    pub fn train(data: &Array2<f64>, config: &AnomalyConfig, seed: u64) -> Result<Self> {
        let forest = IsolationForest::fit(data, config, seed)?;
        let training_scores = forest.raw_scores(data)?;
        let normalization = ScoreNormalization::from_scores(&training_scores);

        info!(
            n_trees = config.n_trees,
            subsample_size = forest.subsample_size,
            p01 = normalization.p01,
            p99 = normalization.p99,
            "Trained anomaly detector"
        );

        Ok(Self {
            forest,
            normalization,
            threshold: config.threshold,
        })
    }

    pub fn normalization(&self) -> ScoreNormalization {
        self.normalization
    }

    /// Score one feature vector
    pub fn assess(&self, point: &[f64]) -> Result<AnomalyAssessment> {
        let raw_score = self.forest.raw_score(point)?;
        let score = self.normalization.normalize(raw_score);
        Ok(AnomalyAssessment {
            score,
            raw_score,
            threshold: self.threshold,
            is_anomaly: score >= self.threshold,
        })
    }
}
