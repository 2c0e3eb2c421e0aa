use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Feature extraction configuration
    pub features: FeatureConfig,

    /// Model training configuration
    pub training: TrainingConfig,

    /// Health scoring configuration
    pub scoring: ScoringConfig,

    /// Technician matching configuration
    pub matcher: MatcherConfig,

    /// State backend configuration
    pub state: StateConfig,

    /// Retraining scheduler configuration
    pub scheduler: SchedulerConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: PM_ENGINE_)
            .add_source(
                config::Environment::with_prefix("PM_ENGINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Sliding window over recent readings (hours)
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// Minimum readings required before features are computed
    #[serde(default = "default_min_readings")]
    pub min_readings: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            min_readings: default_min_readings(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Base seed for reproducible training runs
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Minimum labeled examples required to train
    #[serde(default = "default_min_training_examples")]
    pub min_training_examples: usize,

    /// Label horizon: a corrective visit within this many hours marks a failure
    #[serde(default = "default_label_horizon_hours")]
    pub label_horizon_hours: u64,

    /// How far back training data is gathered (days)
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u64,

    /// Anomaly detector settings
    #[serde(default)]
    pub anomaly: AnomalyConfig,

    /// Failure predictor settings
    #[serde(default)]
    pub failure: FailureConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            min_training_examples: default_min_training_examples(),
            label_horizon_hours: default_label_horizon_hours(),
            lookback_days: default_lookback_days(),
            anomaly: AnomalyConfig::default(),
            failure: FailureConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Number of isolation trees
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Subsample size per tree
    #[serde(default = "default_subsample_size")]
    pub subsample_size: usize,

    /// Decision threshold on the normalized score
    #[serde(default = "default_anomaly_threshold")]
    pub threshold: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            subsample_size: default_subsample_size(),
            threshold: default_anomaly_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    /// Number of bagged decision trees
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    /// Maximum tree depth
    #[serde(default = "default_max_depth")]
    pub max_depth: u16,

    /// Minimum probability before a time-to-failure estimate is reported
    #[serde(default = "default_ttf_threshold")]
    pub ttf_report_threshold: f64,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            ttf_report_threshold: default_ttf_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Component weights for the health composite
    #[serde(default)]
    pub weights: HealthWeights,

    /// Score breakpoints separating the health bands
    #[serde(default)]
    pub breakpoints: TierBreakpoints,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: HealthWeights::default(),
            breakpoints: TierBreakpoints::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthWeights {
    #[serde(default = "default_failure_weight")]
    pub failure: f64,

    #[serde(default = "default_anomaly_weight")]
    pub anomaly: f64,

    #[serde(default = "default_criticality_weight")]
    pub criticality: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            failure: default_failure_weight(),
            anomaly: default_anomaly_weight(),
            criticality: default_criticality_weight(),
        }
    }
}

/// Risk-score breakpoints separating the tiers; risk below `medium` is low
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBreakpoints {
    /// At or above this risk the tier is at least medium
    #[serde(default = "default_medium_breakpoint")]
    pub medium: f64,

    /// At or above this risk the tier is at least high
    #[serde(default = "default_high_breakpoint")]
    pub high: f64,

    /// At or above this risk the tier is critical
    #[serde(default = "default_critical_breakpoint")]
    pub critical: f64,
}

impl Default for TierBreakpoints {
    fn default() -> Self {
        Self {
            medium: default_medium_breakpoint(),
            high: default_high_breakpoint(),
            critical: default_critical_breakpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Component weights for candidate ranking
    #[serde(default)]
    pub weights: MatcherWeights,

    /// Credit granted for an adjacent (related) specialty
    #[serde(default = "default_partial_credit")]
    pub partial_specialty_credit: f64,

    /// Years of experience at which the experience component saturates
    #[serde(default = "default_experience_cap")]
    pub experience_cap_years: u32,

    /// Bounded retries for optimistic workload updates
    #[serde(default = "default_assignment_retries")]
    pub assignment_retry_limit: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            weights: MatcherWeights::default(),
            partial_specialty_credit: default_partial_credit(),
            experience_cap_years: default_experience_cap(),
            assignment_retry_limit: default_assignment_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherWeights {
    #[serde(default = "default_specialty_weight")]
    pub specialty: f64,

    #[serde(default = "default_workload_weight")]
    pub workload: f64,

    #[serde(default = "default_experience_weight")]
    pub experience: f64,

    #[serde(default = "default_location_weight")]
    pub location: f64,
}

impl Default for MatcherWeights {
    fn default() -> Self {
        Self {
            specialty: default_specialty_weight(),
            workload: default_workload_weight(),
            experience: default_experience_weight(),
            location: default_location_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for the embedded database
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Enable periodic retraining
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cron expression for the retraining job
    #[serde(default = "default_retrain_cron")]
    pub retrain_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            retrain_cron: default_retrain_cron(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
        }
    }
}

// Default value functions
fn default_window_hours() -> u64 {
    24
}

fn default_min_readings() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

fn default_min_training_examples() -> usize {
    100
}

fn default_label_horizon_hours() -> u64 {
    168 // 7 days
}

fn default_lookback_days() -> u64 {
    180
}

fn default_n_trees() -> usize {
    100
}

fn default_subsample_size() -> usize {
    256
}

fn default_anomaly_threshold() -> f64 {
    0.6
}

fn default_max_depth() -> u16 {
    10
}

fn default_ttf_threshold() -> f64 {
    0.5
}

fn default_failure_weight() -> f64 {
    0.5
}

fn default_anomaly_weight() -> f64 {
    0.3
}

fn default_criticality_weight() -> f64 {
    0.2
}

fn default_medium_breakpoint() -> f64 {
    0.3
}

fn default_high_breakpoint() -> f64 {
    0.55
}

fn default_critical_breakpoint() -> f64 {
    0.8
}

fn default_specialty_weight() -> f64 {
    0.4
}

fn default_experience_weight() -> f64 {
    0.2
}

fn default_workload_weight() -> f64 {
    0.3
}

fn default_location_weight() -> f64 {
    0.1
}

fn default_partial_credit() -> f64 {
    0.5
}

fn default_experience_cap() -> u32 {
    10
}

fn default_assignment_retries() -> u32 {
    3
}

fn default_retrain_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "predictive-maintenance-engine".to_string()
}

fn default_true() -> bool {
    true
}
