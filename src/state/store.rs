use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::ml::ModelArtifact;
use crate::models::{
    EquipmentProfile, EquipmentType, Incident, MaintenanceRecord, PredictionResult, SensorReading,
    Technician,
};
use crate::state::{EngineStore, IncidentFilter};

/// In-memory store (for tests and single-node deployments)
#[derive(Clone)]
pub struct InMemoryStore {
    equipment: Arc<DashMap<Uuid, EquipmentProfile>>,
    readings: Arc<DashMap<Uuid, Vec<SensorReading>>>,
    maintenance: Arc<DashMap<Uuid, Vec<MaintenanceRecord>>>,
    technicians: Arc<DashMap<Uuid, Technician>>,
    incidents: Arc<DashMap<Uuid, Incident>>,
    predictions: Arc<DashMap<Uuid, Vec<PredictionResult>>>,
    artifacts: Arc<DashMap<EquipmentType, ModelArtifact>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            equipment: Arc::new(DashMap::new()),
            readings: Arc::new(DashMap::new()),
            maintenance: Arc::new(DashMap::new()),
            technicians: Arc::new(DashMap::new()),
            incidents: Arc::new(DashMap::new()),
            predictions: Arc::new(DashMap::new()),
            artifacts: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineStore for InMemoryStore {
    async fn save_equipment(&self, profile: &EquipmentProfile) -> Result<()> {
        self.equipment.insert(profile.id, profile.clone());
        tracing::debug!(equipment_id = %profile.id, "Equipment saved");
        Ok(())
    }

    async fn get_equipment(&self, id: &Uuid) -> Result<Option<EquipmentProfile>> {
        Ok(self.equipment.get(id).map(|entry| entry.clone()))
    }

    async fn list_equipment(&self) -> Result<Vec<EquipmentProfile>> {
        Ok(self
            .equipment
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn save_reading(&self, reading: &SensorReading) -> Result<()> {
        self.readings
            .entry(reading.equipment_id)
            .or_default()
            .push(reading.clone());
        Ok(())
    }

    async fn readings_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        let mut readings: Vec<SensorReading> = self
            .readings
            .get(equipment_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|r| r.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        readings.sort_by_key(|r| r.timestamp);
        Ok(readings)
    }

    async fn save_maintenance(&self, record: &MaintenanceRecord) -> Result<()> {
        self.maintenance
            .entry(record.equipment_id)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn maintenance_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>> {
        let mut records: Vec<MaintenanceRecord> = self
            .maintenance
            .get(equipment_id)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|m| m.performed_at >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|m| m.performed_at);
        Ok(records)
    }

    async fn save_technician(&self, technician: &Technician) -> Result<()> {
        self.technicians.insert(technician.id, technician.clone());
        Ok(())
    }

    async fn get_technician(&self, id: &Uuid) -> Result<Option<Technician>> {
        Ok(self.technicians.get(id).map(|entry| entry.clone()))
    }

    async fn list_technicians(&self) -> Result<Vec<Technician>> {
        Ok(self
            .technicians
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn save_incident(&self, incident: &Incident) -> Result<()> {
        self.incidents.insert(incident.id, incident.clone());
        tracing::debug!(incident_id = %incident.id, "Incident saved");
        Ok(())
    }

    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        Ok(self.incidents.get(id).map(|entry| entry.clone()))
    }

    async fn update_incident(&self, incident: &Incident) -> Result<()> {
        if self.incidents.contains_key(&incident.id) {
            self.incidents.insert(incident.id, incident.clone());
            Ok(())
        } else {
            Err(EngineError::NotFound(format!(
                "Incident {} not found",
                incident.id
            )))
        }
    }

    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>> {
        let mut incidents: Vec<Incident> = self
            .incidents
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|incident| filter.matches(incident))
            .collect();

        // Newest first
        incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let start = (page * page_size) as usize;
        Ok(incidents
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect())
    }

    async fn append_prediction(&self, prediction: &PredictionResult) -> Result<()> {
        self.predictions
            .entry(prediction.equipment_id)
            .or_default()
            .push(prediction.clone());
        Ok(())
    }

    async fn predictions_for(
        &self,
        equipment_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<PredictionResult>> {
        let mut predictions: Vec<PredictionResult> = self
            .predictions
            .get(equipment_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        predictions.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        predictions.truncate(limit);
        Ok(predictions)
    }

    async fn save_artifact(&self, artifact: &ModelArtifact) -> Result<()> {
        self.artifacts
            .insert(artifact.metadata.equipment_type, artifact.clone());
        Ok(())
    }

    async fn get_artifact(&self, equipment_type: EquipmentType) -> Result<Option<ModelArtifact>> {
        Ok(self.artifacts.get(&equipment_type).map(|entry| entry.clone()))
    }
}
