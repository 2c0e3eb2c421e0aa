pub mod health;
pub mod priority;

pub use health::HealthScorer;
pub use priority::{PriorityClassifier, PriorityDecision};
