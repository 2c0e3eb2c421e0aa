use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use uuid::Uuid;

use super::equipment::EquipmentType;

/// How a missing feature value was filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImputationSource {
    /// Last value observed for the channel before the feature window
    LastKnownValue,
    /// Static per-channel typical value, used when no observation exists at all
    TypeMean,
}

/// An ordered feature vector with its imputation audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub equipment_id: Uuid,
    pub equipment_type: EquipmentType,
    pub computed_at: DateTime<Utc>,

    /// Feature names, in schema order
    pub names: Vec<String>,

    /// Feature values, aligned with `names`
    pub values: Vec<f64>,

    /// Audit of which features were imputed rather than observed
    pub imputed: BTreeMap<String, ImputationSource>,
}

impl FeatureVector {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Output of the isolation-forest anomaly detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAssessment {
    /// Normalized anomaly score in [0, 1], higher is more anomalous
    pub score: f64,

    /// Raw isolation-forest score before normalization
    pub raw_score: f64,

    /// Decision threshold applied to the normalized score
    pub threshold: f64,

    /// Whether the reading window is considered anomalous
    pub is_anomaly: bool,
}

/// Estimated remaining time before failure
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeToFailure {
    /// Expected hours until failure
    pub hours: f64,
}

impl TimeToFailure {
    pub fn as_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds((self.hours * 3600.0) as i64)
    }
}

/// Output of the bagged-tree failure predictor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePrediction {
    /// Fraction of trees voting failure, in [0, 1]
    pub probability: f64,

    /// Inter-tree agreement, in [0, 1]
    pub confidence: f64,

    /// Present only when probability clears the reporting threshold
    pub time_to_failure: Option<TimeToFailure>,
}

/// Risk bands derived from the composite score, ordered least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

/// Composite risk assessment with its component breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAssessment {
    /// Composite risk score in [0, 1], higher is worse
    pub risk_score: f64,

    /// Band derived from the score breakpoints
    pub tier: RiskTier,

    /// Failure-probability component, already weighted
    pub failure_component: f64,

    /// Anomaly component, already weighted
    pub anomaly_component: f64,

    /// Equipment-criticality component, already weighted
    pub criticality_component: f64,
}

/// The full decision record for one prediction pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub equipment_type: EquipmentType,
    pub generated_at: DateTime<Utc>,

    pub features: FeatureVector,
    pub anomaly: AnomalyAssessment,
    pub failure: FailurePrediction,
    pub health: HealthAssessment,

    /// True when the rule-based fallback produced the failure estimate
    pub fallback_derived: bool,

    /// Version of the model that served the prediction, if any
    pub model_version: Option<String>,
}
