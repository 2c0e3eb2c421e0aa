pub mod matcher;
pub mod workload;

pub use matcher::TechnicianMatcher;
pub use workload::WorkloadLedger;
