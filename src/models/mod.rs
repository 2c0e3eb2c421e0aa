pub mod equipment;
pub mod incident;
pub mod prediction;
pub mod technician;

pub use equipment::{
    CriticalityTier, EquipmentProfile, EquipmentType, MaintenanceKind, MaintenanceRecord,
    SensorChannel, SensorReading,
};
pub use incident::{
    AssignmentOutcome, AssignmentRecord, Incident, IncidentSignals, IncidentStatus, Priority,
    ProductionImpact,
};
pub use prediction::{
    AnomalyAssessment, FailurePrediction, FeatureVector, HealthAssessment, ImputationSource,
    PredictionResult, RiskTier, TimeToFailure,
};
pub use technician::{SkillLevel, Specialty, Technician};
