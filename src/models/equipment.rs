use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Named sensor channels carried by a telemetry reading
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorChannel {
    Temperature,
    Vibration,
    Pressure,
    Humidity,
    Voltage,
    Current,
}

/// A single immutable telemetry reading for one piece of equipment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorReading {
    /// Unique identifier
    pub id: Uuid,

    /// Equipment this reading belongs to
    pub equipment_id: Uuid,

    /// Measurement timestamp
    pub timestamp: DateTime<Utc>,

    /// Channel values; all values must be finite
    #[validate(custom(function = "validate_channels"))]
    pub channels: BTreeMap<SensorChannel, f64>,
}

impl SensorReading {
    pub fn new(
        equipment_id: Uuid,
        timestamp: DateTime<Utc>,
        channels: BTreeMap<SensorChannel, f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            equipment_id,
            timestamp,
            channels,
        }
    }

    /// Get a single channel value
    pub fn channel(&self, channel: SensorChannel) -> Option<f64> {
        self.channels.get(&channel).copied()
    }
}

fn validate_channels(
    channels: &BTreeMap<SensorChannel, f64>,
) -> std::result::Result<(), ValidationError> {
    if channels.is_empty() {
        return Err(ValidationError::new("empty_channels"));
    }
    for value in channels.values() {
        if !value.is_finite() {
            return Err(ValidationError::new("non_finite_channel_value"));
        }
    }
    Ok(())
}

/// Equipment classes the engine trains per-type models for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EquipmentType {
    Motor,
    Pump,
    Compressor,
    Generator,
    Crusher,
    Conveyor,
}

/// Business criticality of a piece of equipment
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CriticalityTier {
    Low,
    Medium,
    High,
    Critical,
}

impl CriticalityTier {
    /// Numeric weight used by the health composite
    pub fn weight(&self) -> f64 {
        match self {
            CriticalityTier::Low => 0.25,
            CriticalityTier::Medium => 0.5,
            CriticalityTier::High => 0.75,
            CriticalityTier::Critical => 1.0,
        }
    }
}

/// Master-data record for a piece of equipment
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EquipmentProfile {
    /// Unique identifier
    pub id: Uuid,

    /// Human-readable name
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// Equipment type; selects the feature schema and the model set
    pub equipment_type: EquipmentType,

    /// Criticality tier
    pub criticality: CriticalityTier,

    /// Age in months
    pub age_months: u32,

    /// Cumulative operating hours
    pub operating_hours: f64,

    /// Target interval between maintenance visits (days)
    pub maintenance_interval_days: u32,

    /// Site/location
    pub location: Option<String>,

    /// Timestamp of the most recent maintenance visit
    pub last_maintenance: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl EquipmentProfile {
    pub fn new(
        name: String,
        equipment_type: EquipmentType,
        criticality: CriticalityTier,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            equipment_type,
            criticality,
            age_months: 0,
            operating_hours: 0.0,
            maintenance_interval_days: 90,
            location: None,
            last_maintenance: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a maintenance record to the profile
    pub fn record_maintenance(&mut self, record: &MaintenanceRecord) {
        if self
            .last_maintenance
            .map(|prev| record.performed_at > prev)
            .unwrap_or(true)
        {
            self.last_maintenance = Some(record.performed_at);
        }
        self.updated_at = Utc::now();
    }
}

/// Kind of maintenance performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MaintenanceKind {
    /// Unplanned repair after a fault; the failure label source for training
    Corrective,
    Preventive,
    Inspection,
}

/// A completed maintenance visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    pub id: Uuid,
    pub equipment_id: Uuid,
    pub performed_at: DateTime<Utc>,
    pub kind: MaintenanceKind,
    pub notes: Option<String>,
}

impl MaintenanceRecord {
    pub fn new(equipment_id: Uuid, performed_at: DateTime<Utc>, kind: MaintenanceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            equipment_id,
            performed_at,
            kind,
            notes: None,
        }
    }
}
