use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::Validate;

/// Technician trade specialties
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Specialty {
    Mechanical,
    Electrical,
    Hydraulic,
    Pneumatic,
    Electronics,
    Instrumentation,
}

/// Seniority bands for technicians
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SkillLevel {
    Junior,
    Intermediate,
    Senior,
    Expert,
}

/// A maintenance technician available for assignment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Technician {
    /// Unique identifier
    pub id: Uuid,

    /// Full name
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// Trade specialties held
    #[validate(length(min = 1))]
    pub specialties: Vec<Specialty>,

    /// Seniority band
    pub skill_level: SkillLevel,

    /// Years of experience
    pub experience_years: u32,

    /// Number of currently assigned open incidents
    pub active_assignments: u32,

    /// Maximum concurrent assignments the technician accepts
    #[validate(range(min = 1))]
    pub max_assignments: u32,

    /// Whether the technician is on shift and assignable
    pub available: bool,

    /// Current site/location
    pub location: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Technician {
    pub fn new(name: String, specialties: Vec<Specialty>, skill_level: SkillLevel) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            specialties,
            skill_level,
            experience_years: 0,
            active_assignments: 0,
            max_assignments: 5,
            available: true,
            location: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_specialty(&self, specialty: Specialty) -> bool {
        self.specialties.contains(&specialty)
    }

    /// True when the technician can accept one more assignment
    pub fn has_capacity(&self) -> bool {
        self.available && self.active_assignments < self.max_assignments
    }

    /// Fraction of capacity still free, in [0, 1]
    pub fn remaining_capacity(&self) -> f64 {
        if self.max_assignments == 0 {
            return 0.0;
        }
        let used = self.active_assignments.min(self.max_assignments) as f64;
        1.0 - used / self.max_assignments as f64
    }
}
