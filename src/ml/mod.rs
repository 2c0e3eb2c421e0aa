pub mod anomaly;
pub mod failure;
pub mod features;
pub mod models;
pub mod registry;

pub use anomaly::{AnomalyDetector, IsolationForest};
pub use failure::FailurePredictor;
pub use features::FeatureExtractor;
pub use models::{
    ModelArtifact, ModelMetadata, ModelMetrics, ScoreNormalization, TrainingDataset,
    TrainingExample,
};
pub use registry::{ActiveModel, ModelRegistry};
