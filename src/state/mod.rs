pub mod sled_store;
pub mod store;

pub use sled_store::SledStore;
pub use store::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{StateBackend, StateConfig};
use crate::error::{EngineError, Result};
use crate::ml::ModelArtifact;
use crate::models::{
    EquipmentProfile, EquipmentType, Incident, IncidentStatus, MaintenanceRecord, PredictionResult,
    Priority, SensorReading, Technician,
};

/// Trait for engine storage operations
#[async_trait]
pub trait EngineStore: Send + Sync {
    /// Save or replace an equipment profile
    async fn save_equipment(&self, profile: &EquipmentProfile) -> Result<()>;

    /// Get an equipment profile by ID
    async fn get_equipment(&self, id: &Uuid) -> Result<Option<EquipmentProfile>>;

    /// List all equipment profiles
    async fn list_equipment(&self) -> Result<Vec<EquipmentProfile>>;

    /// Append a sensor reading
    async fn save_reading(&self, reading: &SensorReading) -> Result<()>;

    /// Readings for one piece of equipment since a timestamp, oldest first
    async fn readings_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>>;

    /// Append a maintenance record
    async fn save_maintenance(&self, record: &MaintenanceRecord) -> Result<()>;

    /// Maintenance records for one piece of equipment since a timestamp
    async fn maintenance_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>>;

    /// Save or replace a technician
    async fn save_technician(&self, technician: &Technician) -> Result<()>;

    /// Get a technician by ID
    async fn get_technician(&self, id: &Uuid) -> Result<Option<Technician>>;

    /// List all technicians
    async fn list_technicians(&self) -> Result<Vec<Technician>>;

    /// Save an incident
    async fn save_incident(&self, incident: &Incident) -> Result<()>;

    /// Get an incident by ID
    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>>;

    /// Update an existing incident
    async fn update_incident(&self, incident: &Incident) -> Result<()>;

    /// List incidents with filtering, newest first
    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>>;

    /// Append a prediction to the audit log
    async fn append_prediction(&self, prediction: &PredictionResult) -> Result<()>;

    /// Most recent predictions for one piece of equipment, newest first
    async fn predictions_for(
        &self,
        equipment_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<PredictionResult>>;

    /// Save or replace the model artifact for an equipment type
    async fn save_artifact(&self, artifact: &ModelArtifact) -> Result<()>;

    /// Get the model artifact for an equipment type
    async fn get_artifact(&self, equipment_type: EquipmentType) -> Result<Option<ModelArtifact>>;
}

/// Filter for querying incidents
#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub statuses: Vec<IncidentStatus>,
    pub priorities: Vec<Priority>,
    pub equipment_id: Option<Uuid>,
    pub open_only: bool,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        let status_match = self.statuses.is_empty() || self.statuses.contains(&incident.status);
        let priority_match =
            self.priorities.is_empty() || self.priorities.contains(&incident.priority);
        let equipment_match = self
            .equipment_id
            .map(|id| incident.equipment_id == id)
            .unwrap_or(true);
        let open_match = !self.open_only || !incident.status.is_terminal();

        status_match && priority_match && equipment_match && open_match
    }
}

/// Create a store from configuration
pub fn create_store(config: &StateConfig) -> Result<Arc<dyn EngineStore>> {
    match config.backend {
        StateBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StateBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                EngineError::Configuration(
                    "state.path is required for the sled backend".to_string(),
                )
            })?;
            Ok(Arc::new(SledStore::new(path)?))
        }
    }
}
