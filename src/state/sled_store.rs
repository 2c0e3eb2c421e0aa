use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::ml::ModelArtifact;
use crate::models::{
    EquipmentProfile, EquipmentType, Incident, MaintenanceRecord, PredictionResult, SensorReading,
    Technician,
};
use crate::state::{EngineStore, IncidentFilter};

/// Persistent store using the sled embedded database
///
/// Time-series trees (readings, maintenance, predictions) use composite
/// keys of equipment id followed by a big-endian timestamp, so a prefix
/// scan yields one equipment's records in time order.
#[derive(Clone)]
pub struct SledStore {
    _db: Arc<Db>,
    equipment_tree: sled::Tree,
    readings_tree: sled::Tree,
    maintenance_tree: sled::Tree,
    technicians_tree: sled::Tree,
    incidents_tree: sled::Tree,
    predictions_tree: sled::Tree,
    artifacts_tree: sled::Tree,
}

impl SledStore {
    /// Open or create a sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(&path)
            .map_err(|e| EngineError::Storage(format!("Failed to open sled database: {}", e)))?;

        fn open_tree(db: &Db, name: &str) -> Result<sled::Tree> {
            db.open_tree(name)
                .map_err(|e| EngineError::Storage(format!("Failed to open {} tree: {}", name, e)))
        }

        let equipment_tree = open_tree(&db, "equipment")?;
        let readings_tree = open_tree(&db, "readings")?;
        let maintenance_tree = open_tree(&db, "maintenance")?;
        let technicians_tree = open_tree(&db, "technicians")?;
        let incidents_tree = open_tree(&db, "incidents")?;
        let predictions_tree = open_tree(&db, "predictions")?;
        let artifacts_tree = open_tree(&db, "artifacts")?;

        let store = Self {
            equipment_tree,
            readings_tree,
            maintenance_tree,
            technicians_tree,
            incidents_tree,
            predictions_tree,
            artifacts_tree,
            _db: Arc::new(db),
        };

        tracing::info!(path = ?path.as_ref(), "Initialized sled store");
        Ok(store)
    }

    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value)
            .map_err(|e| EngineError::Serialization(format!("Failed to serialize: {}", e)))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes)
            .map_err(|e| EngineError::Serialization(format!("Failed to deserialize: {}", e)))
    }

    /// equipment id + big-endian millis + record id, so prefix scans are time-ordered
    fn timeseries_key(equipment_id: &Uuid, at: DateTime<Utc>, record_id: &Uuid) -> Vec<u8> {
        let mut key = Vec::with_capacity(40);
        key.extend_from_slice(equipment_id.as_bytes());
        key.extend_from_slice(&(at.timestamp_millis() as u64).to_be_bytes());
        key.extend_from_slice(record_id.as_bytes());
        key
    }

    fn put(tree: &sled::Tree, key: &[u8], bytes: Vec<u8>) -> Result<()> {
        tree.insert(key, bytes)
            .map_err(|e| EngineError::Storage(format!("Failed to write: {}", e)))?;
        Ok(())
    }

    fn scan_equipment<T: DeserializeOwned>(
        tree: &sled::Tree,
        equipment_id: &Uuid,
    ) -> Result<Vec<T>> {
        tree.scan_prefix(equipment_id.as_bytes())
            .map(|item| {
                let (_, bytes) =
                    item.map_err(|e| EngineError::Storage(format!("Failed to scan: {}", e)))?;
                Self::deserialize(&bytes)
            })
            .collect()
    }
}

#[async_trait]
impl EngineStore for SledStore {
    async fn save_equipment(&self, profile: &EquipmentProfile) -> Result<()> {
        Self::put(
            &self.equipment_tree,
            profile.id.as_bytes(),
            Self::serialize(profile)?,
        )
    }

    async fn get_equipment(&self, id: &Uuid) -> Result<Option<EquipmentProfile>> {
        self.equipment_tree
            .get(id.as_bytes())
            .map_err(|e| EngineError::Storage(format!("Failed to read equipment: {}", e)))?
            .map(|bytes| Self::deserialize(&bytes))
            .transpose()
    }

    async fn list_equipment(&self) -> Result<Vec<EquipmentProfile>> {
        self.equipment_tree
            .iter()
            .map(|item| {
                let (_, bytes) = item
                    .map_err(|e| EngineError::Storage(format!("Failed to scan equipment: {}", e)))?;
                Self::deserialize(&bytes)
            })
            .collect()
    }

    async fn save_reading(&self, reading: &SensorReading) -> Result<()> {
        let key = Self::timeseries_key(&reading.equipment_id, reading.timestamp, &reading.id);
        Self::put(&self.readings_tree, &key, Self::serialize(reading)?)
    }

    async fn readings_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        let readings: Vec<SensorReading> =
            Self::scan_equipment(&self.readings_tree, equipment_id)?;
        Ok(readings
            .into_iter()
            .filter(|r| r.timestamp >= since)
            .collect())
    }

    async fn save_maintenance(&self, record: &MaintenanceRecord) -> Result<()> {
        let key = Self::timeseries_key(&record.equipment_id, record.performed_at, &record.id);
        Self::put(&self.maintenance_tree, &key, Self::serialize(record)?)
    }

    async fn maintenance_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>> {
        let records: Vec<MaintenanceRecord> =
            Self::scan_equipment(&self.maintenance_tree, equipment_id)?;
        Ok(records
            .into_iter()
            .filter(|m| m.performed_at >= since)
            .collect())
    }

    async fn save_technician(&self, technician: &Technician) -> Result<()> {
        Self::put(
            &self.technicians_tree,
            technician.id.as_bytes(),
            Self::serialize(technician)?,
        )
    }

    async fn get_technician(&self, id: &Uuid) -> Result<Option<Technician>> {
        self.technicians_tree
            .get(id.as_bytes())
            .map_err(|e| EngineError::Storage(format!("Failed to read technician: {}", e)))?
            .map(|bytes| Self::deserialize(&bytes))
            .transpose()
    }

    async fn list_technicians(&self) -> Result<Vec<Technician>> {
        self.technicians_tree
            .iter()
            .map(|item| {
                let (_, bytes) = item.map_err(|e| {
                    EngineError::Storage(format!("Failed to scan technicians: {}", e))
                })?;
                Self::deserialize(&bytes)
            })
            .collect()
    }

    async fn save_incident(&self, incident: &Incident) -> Result<()> {
        Self::put(
            &self.incidents_tree,
            incident.id.as_bytes(),
            Self::serialize(incident)?,
        )
    }

    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        self.incidents_tree
            .get(id.as_bytes())
            .map_err(|e| EngineError::Storage(format!("Failed to read incident: {}", e)))?
            .map(|bytes| Self::deserialize(&bytes))
            .transpose()
    }

    async fn update_incident(&self, incident: &Incident) -> Result<()> {
        if self
            .incidents_tree
            .contains_key(incident.id.as_bytes())
            .map_err(|e| EngineError::Storage(format!("Failed to read incident: {}", e)))?
        {
            self.save_incident(incident).await
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
            .incidents_tree
            .iter()
            .map(|item| {
                let (_, bytes) = item
                    .map_err(|e| EngineError::Storage(format!("Failed to scan incidents: {}", e)))?;
                Self::deserialize(&bytes)
            })
            .collect::<Result<Vec<Incident>>>()?
            .into_iter()
            .filter(|incident| filter.matches(incident))
            .collect();

        incidents.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let start = (page * page_size) as usize;
        Ok(incidents
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect())
    }

    async fn append_prediction(&self, prediction: &PredictionResult) -> Result<()> {
        let key = Self::timeseries_key(
            &prediction.equipment_id,
            prediction.generated_at,
            &prediction.id,
        );
        Self::put(&self.predictions_tree, &key, Self::serialize(prediction)?)
    }

    async fn predictions_for(
        &self,
        equipment_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<PredictionResult>> {
        let mut predictions: Vec<PredictionResult> =
            Self::scan_equipment(&self.predictions_tree, equipment_id)?;
        predictions.reverse();
        predictions.truncate(limit);
        Ok(predictions)
    }

    async fn save_artifact(&self, artifact: &ModelArtifact) -> Result<()> {
        Self::put(
            &self.artifacts_tree,
            artifact.metadata.equipment_type.to_string().as_bytes(),
            Self::serialize(artifact)?,
        )
    }

    async fn get_artifact(&self, equipment_type: EquipmentType) -> Result<Option<ModelArtifact>> {
        self.artifacts_tree
            .get(equipment_type.to_string().as_bytes())
            .map_err(|e| EngineError::Storage(format!("Failed to read artifact: {}", e)))?
            .map(|bytes| Self::deserialize(&bytes))
            .transpose()
    }
}
