use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::ml::anomaly::AnomalyDetector;
use crate::ml::failure::FailurePredictor;
use crate::ml::models::{ModelArtifact, ModelMetadata};
use crate::models::EquipmentType;

/// A fully trained model set for one equipment type
pub struct ActiveModel {
    pub metadata: ModelMetadata,
    pub anomaly: AnomalyDetector,
    pub failure: FailurePredictor,
    pub activated_at: DateTime<Utc>,
}

impl ActiveModel {
    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}

/// Per-equipment-type registry of active models
///
/// Activation replaces the `Arc` for a type in one map write; readers that
/// already cloned the previous `Arc` keep scoring against it undisturbed.
#[derive(Default)]
pub struct ModelRegistry {
    models: DashMap<EquipmentType, Arc<ActiveModel>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
        }
    }

    /// Fetch the active model for an equipment type
    pub fn get(&self, equipment_type: EquipmentType) -> Result<Arc<ActiveModel>> {
        self.models
            .get(&equipment_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| EngineError::ModelNotTrained(equipment_type.to_string()))
    }

    /// Whether a trained model exists for an equipment type
    pub fn has_model(&self, equipment_type: EquipmentType) -> bool {
        self.models.contains_key(&equipment_type)
    }

    /// Activate a new model set, replacing any previous one
    pub fn activate(&self, model: ActiveModel) -> Arc<ActiveModel> {
        let equipment_type = model.metadata.equipment_type;
        let version = model.metadata.version.clone();
        let arc = Arc::new(model);
        let previous = self.models.insert(equipment_type, Arc::clone(&arc));

        info!(
            equipment_type = %equipment_type,
            version = %version,
            replaced = previous.as_ref().map(|p| p.version().to_string()),
            "Activated model"
        );
        arc
    }

    /// List every equipment type with an active model, with metadata
    pub fn list(&self) -> Vec<ModelMetadata> {
        self.models
            .iter()
            .map(|entry| entry.value().metadata.clone())
            .collect()
    }

    /// Build the persistable artifact for the active model of a type
    pub fn artifact(
        &self,
        equipment_type: EquipmentType,
        dataset_checksum: String,
    ) -> Result<ModelArtifact> {
        let model = self.get(equipment_type)?;
        Ok(ModelArtifact {
            metadata: model.metadata.clone(),
            normalization: model.anomaly.normalization(),
            dataset_checksum,
        })
    }
}
