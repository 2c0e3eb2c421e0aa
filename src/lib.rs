//! Predictive maintenance decision engine
//!
//! Turns raw equipment telemetry into maintenance decisions: per-type
//! anomaly and failure models, a composite risk score, rule-tagged
//! incident priorities, and deterministic technician assignment.

pub mod assignment;
pub mod config;
pub mod engine;
pub mod error;
pub mod ml;
pub mod models;
pub mod scheduler;
pub mod scoring;
pub mod state;

pub use config::Config;
pub use engine::{MaintenanceEngine, RetrainHandle};
pub use error::{EngineError, Result};
pub use scheduler::RetrainScheduler;

use crate::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing from the observability configuration
///
/// Safe to call once per process; respects RUST_LOG when set.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
