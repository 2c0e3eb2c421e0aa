use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use super::equipment::CriticalityTier;
use super::technician::Specialty;

/// Lifecycle states for a maintenance incident
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentStatus {
    Pending,
    InProgress,
    Resolved,
    Cancelled,
}

impl IncidentStatus {
    /// Check whether a transition to `next` is allowed
    pub fn can_transition_to(&self, next: IncidentStatus) -> bool {
        use IncidentStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Resolved)
                | (InProgress, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IncidentStatus::Resolved | IncidentStatus::Cancelled)
    }
}

/// Priority bands produced by the classifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Production impact of the underlying fault
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductionImpact {
    None,
    Reduced,
    Stopped,
}

/// The evidence bundle the priority classifier evaluates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSignals {
    /// Composite risk score in [0, 1], higher is worse
    pub risk_score: f64,

    /// Anomaly flag from the detector
    pub anomaly_detected: bool,

    /// Failure probability in [0, 1]
    pub failure_probability: f64,

    /// Criticality of the affected equipment
    pub criticality: CriticalityTier,

    /// Current production impact
    pub production_impact: ProductionImpact,

    /// True when the probability came from the rule-based fallback
    pub fallback_derived: bool,
}

/// A maintenance incident raised against a piece of equipment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Incident {
    /// Unique identifier
    pub id: Uuid,

    /// Affected equipment
    pub equipment_id: Uuid,

    /// Short description of the fault
    #[validate(length(min = 1, max = 2000))]
    pub description: String,

    /// Priority band assigned at creation
    pub priority: Priority,

    /// Rule identifier that produced the priority
    pub priority_rule: String,

    /// Set when the classifier could not read the signals with confidence
    pub low_confidence: bool,

    /// Evidence evaluated at creation time
    pub signals: IncidentSignals,

    /// Specialties that qualify a technician to work the incident
    pub required_specialties: Vec<Specialty>,

    /// Lifecycle state
    pub status: IncidentStatus,

    /// Assignment, once a technician has been matched
    pub assignment: Option<AssignmentRecord>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Resolution timestamp, for completed incidents
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn new(
        equipment_id: Uuid,
        description: String,
        priority: Priority,
        priority_rule: String,
        low_confidence: bool,
        signals: IncidentSignals,
        required_specialties: Vec<Specialty>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            equipment_id,
            description,
            priority,
            priority_rule,
            low_confidence,
            signals,
            required_specialties,
            status: IncidentStatus::Pending,
            assignment: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    /// Attach an assignment and move the incident to in-progress
    pub fn assign(&mut self, record: AssignmentRecord) {
        self.assignment = Some(record);
        self.status = IncidentStatus::InProgress;
        self.updated_at = Utc::now();
    }
}

/// The durable record of a technician assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub technician_id: Uuid,
    pub technician_name: String,
    pub score: f64,
    pub reasons: Vec<String>,
    pub assigned_at: DateTime<Utc>,
}

/// The matcher's ranked verdict for one candidate technician
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentOutcome {
    pub technician_id: Uuid,
    pub technician_name: String,

    /// Total weighted score in [0, 1]
    pub score: f64,

    /// Specialty component contribution
    pub specialty_score: f64,

    /// Experience component contribution
    pub experience_score: f64,

    /// Workload component contribution
    pub workload_score: f64,

    /// Location component contribution
    pub location_score: f64,

    /// Human-readable justification for the ranking
    pub reasons: Vec<String>,
}

impl AssignmentOutcome {
    pub fn into_record(self, assigned_at: DateTime<Utc>) -> AssignmentRecord {
        AssignmentRecord {
            technician_id: self.technician_id,
            technician_name: self.technician_name,
            score: self.score,
            reasons: self.reasons,
            assigned_at,
        }
    }
}
