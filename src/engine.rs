use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::assignment::{TechnicianMatcher, WorkloadLedger};
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::ml::{
    ActiveModel, FailurePredictor, FeatureExtractor, ModelArtifact, ModelMetadata, ModelRegistry,
    TrainingDataset, TrainingExample,
};
use crate::ml::anomaly::AnomalyDetector;
use crate::models::{
    AnomalyAssessment, AssignmentOutcome, EquipmentProfile, EquipmentType, FailurePrediction,
    FeatureVector, HealthAssessment, Incident, IncidentSignals, IncidentStatus, MaintenanceKind,
    MaintenanceRecord, PredictionResult, ProductionImpact, SensorReading, Technician,
};
use crate::scoring::{HealthScorer, PriorityClassifier, PriorityDecision};
use crate::state::{EngineStore, IncidentFilter};

/// Cancellation handle for a running retraining task
///
/// Cancellation is checked at phase boundaries and always before a new
/// model is activated; an already-activated model is never rolled back.
#[derive(Clone, Default)]
pub struct RetrainHandle {
    cancelled: Arc<AtomicBool>,
}

impl RetrainHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn checkpoint(&self, phase: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled(format!(
                "Cancelled before {}",
                phase
            )))
        } else {
            Ok(())
        }
    }
}

/// Static rule applied when no trained model exists for an equipment type
///
/// Probability rises with maintenance overdue, hot temperature and high
/// vibration readings. Results through this path are tagged fallback-derived.
fn rule_based_assessment(features: &FeatureVector) -> (AnomalyAssessment, FailurePrediction) {
    let mut probability: f64 = 0.1;

    if features.get("temperature_mean").unwrap_or(0.0) > 80.0 {
        probability += 0.25;
    }
    if features.get("vibration_mean").unwrap_or(0.0) > 4.0 {
        probability += 0.3;
    }
    if features.get("maintenance_frequency").unwrap_or(0.0) < 1.0 / 12.0 {
        probability += 0.15;
    }
    let probability = probability.clamp(0.0, 1.0);

    let anomaly = AnomalyAssessment {
        score: probability,
        raw_score: probability,
        threshold: 1.0,
        is_anomaly: false,
    };
    let failure = FailurePrediction {
        probability,
        // Rule output carries low confidence by construction
        confidence: 0.3,
        time_to_failure: None,
    };
    (anomaly, failure)
}

/// The predictive maintenance decision engine
///
/// Owns the model registry, the scoring pipeline, and the assignment path.
/// All durable state goes through the configured store.
pub struct MaintenanceEngine {
    config: Config,
    store: Arc<dyn EngineStore>,
    registry: Arc<ModelRegistry>,
    extractor: FeatureExtractor,
    scorer: HealthScorer,
    classifier: PriorityClassifier,
    matcher: TechnicianMatcher,
    workload: Arc<WorkloadLedger>,
}

impl MaintenanceEngine {
    pub fn new(config: Config, store: Arc<dyn EngineStore>) -> Self {
        let extractor = FeatureExtractor::new(config.features.clone());
        let scorer = HealthScorer::new(config.scoring.clone());
        let matcher = TechnicianMatcher::new(config.matcher.clone());
        let workload = Arc::new(WorkloadLedger::new());

        Self {
            config,
            store,
            registry: Arc::new(ModelRegistry::new()),
            extractor,
            scorer,
            classifier: PriorityClassifier::new(),
            matcher,
            workload,
        }
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn store(&self) -> Arc<dyn EngineStore> {
        Arc::clone(&self.store)
    }

    // ---- registration ----

    pub async fn register_equipment(&self, profile: EquipmentProfile) -> Result<Uuid> {
        profile
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        let id = profile.id;
        self.store.save_equipment(&profile).await?;
        info!(equipment_id = %id, name = %profile.name, "Registered equipment");
        Ok(id)
    }

    pub async fn register_technician(&self, technician: Technician) -> Result<Uuid> {
        technician
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        let id = technician.id;
        self.workload.register(
            id,
            technician.active_assignments,
            technician.max_assignments,
        );
        self.store.save_technician(&technician).await?;
        info!(technician_id = %id, name = %technician.name, "Registered technician");
        Ok(id)
    }

    pub async fn record_reading(&self, reading: SensorReading) -> Result<()> {
        reading
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        if self.store.get_equipment(&reading.equipment_id).await?.is_none() {
            return Err(EngineError::NotFound(format!(
                "Equipment {} not found",
                reading.equipment_id
            )));
        }
        self.store.save_reading(&reading).await
    }

    pub async fn record_maintenance(&self, record: MaintenanceRecord) -> Result<()> {
        let mut profile = self
            .store
            .get_equipment(&record.equipment_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Equipment {} not found", record.equipment_id))
            })?;

        profile.record_maintenance(&record);
        self.store.save_maintenance(&record).await?;
        self.store.save_equipment(&profile).await
    }

    // ---- prediction ----

    async fn assemble_features(
        &self,
        profile: &EquipmentProfile,
        as_of: DateTime<Utc>,
    ) -> Result<FeatureVector> {
        let window_start = as_of - Duration::hours(self.config.features.window_hours as i64);
        // Extra history beyond the window feeds last-known-value imputation
        let readings = self
            .store
            .readings_since(&profile.id, window_start - Duration::days(7))
            .await?;
        let maintenance = self
            .store
            .maintenance_since(&profile.id, as_of - Duration::days(365))
            .await?;
        self.extractor
            .extract(profile, &readings, &maintenance, as_of)
    }

    /// Compute the current feature window for one piece of equipment
    pub async fn extract_features(&self, equipment_id: Uuid) -> Result<FeatureVector> {
        let profile = self
            .store
            .get_equipment(&equipment_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Equipment {} not found", equipment_id))
            })?;
        self.assemble_features(&profile, Utc::now()).await
    }

    /// Score a feature vector against the active anomaly model for its type
    pub fn score_anomaly(&self, features: &FeatureVector) -> Result<AnomalyAssessment> {
        let model = self.registry.get(features.equipment_type)?;
        model.anomaly.assess(&features.values)
    }

    /// Run the active failure model for the vector's equipment type
    pub fn predict_failure(&self, features: &FeatureVector) -> Result<FailurePrediction> {
        let model = self.registry.get(features.equipment_type)?;
        model.failure.predict(&features.values)
    }

    /// Current risk assessment for one piece of equipment
    ///
    /// Runs the full prediction pass, so the result lands in the audit log.
    pub async fn assess_health(&self, equipment_id: Uuid) -> Result<HealthAssessment> {
        Ok(self.predict(equipment_id).await?.health)
    }

    /// Map already-extracted incident signals to a priority decision
    ///
    /// The decision carries the required specialty set, derived from the
    /// description cues with the equipment-type trade as fallback.
    pub fn classify_priority(
        &self,
        signals: &IncidentSignals,
        description: &str,
        equipment_type: EquipmentType,
    ) -> PriorityDecision {
        self.classifier.classify(signals, description, equipment_type)
    }

    /// Run the full prediction pass for one piece of equipment
    ///
    /// Falls back to the static rule when no trained model exists for the
    /// equipment type; the result is then tagged fallback-derived.
    #[instrument(skip(self), fields(equipment_id = %equipment_id))]
    pub async fn predict(&self, equipment_id: Uuid) -> Result<PredictionResult> {
        let as_of = Utc::now();
        let profile = self
            .store
            .get_equipment(&equipment_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Equipment {} not found", equipment_id))
            })?;

        let features = self.assemble_features(&profile, as_of).await?;

        let (anomaly, failure, fallback_derived, model_version) =
            match self.registry.get(profile.equipment_type) {
                Ok(model) => {
                    let anomaly = model.anomaly.assess(&features.values)?;
                    let failure = model.failure.predict(&features.values)?;
                    (anomaly, failure, false, Some(model.version().to_string()))
                }
                Err(EngineError::ModelNotTrained(_)) => {
                    warn!(
                        equipment_type = %profile.equipment_type,
                        "No trained model, using rule-based fallback"
                    );
                    let (anomaly, failure) = rule_based_assessment(&features);
                    (anomaly, failure, true, None)
                }
                Err(e) => return Err(e),
            };

        let health = self
            .scorer
            .score(profile.id, profile.criticality, &anomaly, &failure);

        let result = PredictionResult {
            id: Uuid::new_v4(),
            equipment_id,
            equipment_type: profile.equipment_type,
            generated_at: as_of,
            features,
            anomaly,
            failure,
            health,
            fallback_derived,
            model_version,
        };

        self.store.append_prediction(&result).await?;
        Ok(result)
    }

    /// Recent prediction audit log for one piece of equipment
    pub async fn prediction_history(
        &self,
        equipment_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PredictionResult>> {
        self.store.predictions_for(&equipment_id, limit).await
    }

    // ---- incidents ----

    /// Evaluate equipment and raise a prioritized incident
    #[instrument(skip(self, description), fields(equipment_id = %equipment_id))]
    pub async fn raise_incident(
        &self,
        equipment_id: Uuid,
        description: String,
        production_impact: ProductionImpact,
    ) -> Result<Incident> {
        let profile = self
            .store
            .get_equipment(&equipment_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Equipment {} not found", equipment_id))
            })?;

        let prediction = self.predict(equipment_id).await?;

        let signals = IncidentSignals {
            risk_score: prediction.health.risk_score,
            anomaly_detected: prediction.anomaly.is_anomaly,
            failure_probability: prediction.failure.probability,
            criticality: profile.criticality,
            production_impact,
            fallback_derived: prediction.fallback_derived,
        };
        let decision = self
            .classifier
            .classify(&signals, &description, profile.equipment_type);

        let incident = Incident::new(
            equipment_id,
            description,
            decision.priority,
            decision.rule,
            decision.low_confidence,
            signals,
            decision.required_specialties,
        );

        self.store.save_incident(&incident).await?;
        info!(
            incident_id = %incident.id,
            priority = %incident.priority,
            rule = %incident.priority_rule,
            low_confidence = incident.low_confidence,
            "Raised incident"
        );
        Ok(incident)
    }

    /// Rank the roster for an incident without reserving anyone
    pub async fn recommend_technicians(
        &self,
        incident_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AssignmentOutcome>> {
        let incident = self
            .store
            .get_incident(&incident_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Incident {} not found", incident_id))
            })?;
        let equipment_location = self
            .store
            .get_equipment(&incident.equipment_id)
            .await?
            .and_then(|p| p.location);
        let roster = self.store.list_technicians().await?;
        let mut ranked = self.matcher.rank(
            &roster,
            &incident.required_specialties,
            equipment_location.as_deref(),
        );
        if ranked.is_empty() {
            return Err(EngineError::NoAvailableTechnician(format!(
                "No qualified technician for incident {}",
                incident.id
            )));
        }
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Match and assign the best available technician to an incident
    #[instrument(skip(self), fields(incident_id = %incident_id))]
    pub async fn assign_technician(&self, incident_id: Uuid) -> Result<Incident> {
        let mut incident = self
            .store
            .get_incident(&incident_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Incident {} not found", incident_id))
            })?;

        if incident.status != IncidentStatus::Pending {
            return Err(EngineError::InvalidStateTransition(format!(
                "Incident {} is {}, only pending incidents can be assigned",
                incident_id, incident.status
            )));
        }

        let equipment_location = self
            .store
            .get_equipment(&incident.equipment_id)
            .await?
            .and_then(|p| p.location);

        let roster = self.store.list_technicians().await?;
        let ranked = self.matcher.rank(
            &roster,
            &incident.required_specialties,
            equipment_location.as_deref(),
        );

        if ranked.is_empty() {
            return Err(EngineError::NoAvailableTechnician(format!(
                "No qualified technician for incident {}",
                incident.id
            )));
        }

        // Walk the ranking; a candidate can fill up between scoring and
        // reservation, in which case the next one is tried, up to the
        // configured attempt limit
        let attempts = self.config.matcher.assignment_retry_limit.max(1) as usize;
        let mut outcome = None;
        for candidate in ranked.into_iter().take(attempts) {
            match self.workload.reserve(candidate.technician_id) {
                Ok(_) => {
                    outcome = Some(candidate);
                    break;
                }
                Err(EngineError::NoAvailableTechnician(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        let outcome = outcome.ok_or_else(|| {
            EngineError::NoAvailableTechnician(
                "Every ranked candidate was at capacity".to_string(),
            )
        })?;

        let technician_id = outcome.technician_id;
        match self.persist_assignment(&mut incident, outcome).await {
            Ok(()) => Ok(incident),
            Err(e) => {
                // Roll the reservation back so the counter keeps matching
                // the incident's open assignments
                if let Err(release_err) = self.workload.release(technician_id) {
                    warn!(error = %release_err, "Failed to roll back reservation");
                }
                Err(e)
            }
        }
    }

    async fn persist_assignment(
        &self,
        incident: &mut Incident,
        outcome: AssignmentOutcome,
    ) -> Result<()> {
        if let Some(mut technician) = self.store.get_technician(&outcome.technician_id).await? {
            technician.active_assignments =
                self.workload.active(technician.id).unwrap_or(technician.active_assignments);
            technician.updated_at = Utc::now();
            self.store.save_technician(&technician).await?;
        }

        let record = outcome.into_record(Utc::now());
        info!(
            incident_id = %incident.id,
            technician = %record.technician_name,
            score = record.score,
            "Assigned technician"
        );
        incident.assign(record);
        self.store.update_incident(incident).await?;
        Ok(())
    }

    /// Apply a validated status transition
    pub async fn update_incident_status(
        &self,
        incident_id: Uuid,
        next: IncidentStatus,
    ) -> Result<Incident> {
        let mut incident = self
            .store
            .get_incident(&incident_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("Incident {} not found", incident_id))
            })?;

        if !incident.status.can_transition_to(next) {
            return Err(EngineError::InvalidStateTransition(format!(
                "Cannot move incident {} from {} to {}",
                incident_id, incident.status, next
            )));
        }

        // Leaving the working state frees the technician's slot
        if incident.status == IncidentStatus::InProgress && next.is_terminal() {
            if let Some(ref assignment) = incident.assignment {
                let technician_id = assignment.technician_id;
                let remaining = self.workload.release(technician_id)?;
                if let Some(mut technician) = self.store.get_technician(&technician_id).await? {
                    technician.active_assignments = remaining;
                    technician.updated_at = Utc::now();
                    self.store.save_technician(&technician).await?;
                }
            }
        }

        incident.status = next;
        incident.updated_at = Utc::now();
        if next == IncidentStatus::Resolved {
            incident.resolved_at = Some(incident.updated_at);
        }
        self.store.update_incident(&incident).await?;
        Ok(incident)
    }

    pub async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>> {
        self.store.list_incidents(filter, page, page_size).await
    }

    // ---- training ----

    /// Retrain the model set for one equipment type
    ///
    /// Training is seeded and reproducible; the new model replaces the old
    /// one atomically at the end, and only if the handle was not cancelled.
    #[instrument(skip(self, handle), fields(equipment_type = %equipment_type))]
    pub async fn retrain(
        &self,
        equipment_type: EquipmentType,
        handle: &RetrainHandle,
    ) -> Result<ModelMetadata> {
        let training = &self.config.training;
        handle.checkpoint("dataset assembly")?;

        let dataset = self.build_dataset(equipment_type).await?;
        if dataset.n_samples < training.min_training_examples {
            return Err(EngineError::InsufficientData(format!(
                "{} has {} training examples, {} required",
                equipment_type, dataset.n_samples, training.min_training_examples
            )));
        }

        handle.checkpoint("anomaly training")?;
        let anomaly =
            AnomalyDetector::train(&dataset.normal_features(), &training.anomaly, training.seed)?;

        handle.checkpoint("failure training")?;
        let failure = FailurePredictor::train(&dataset, &training.failure, training.seed)?;

        let metadata = ModelMetadata {
            equipment_type,
            version: format!("{}", Utc::now().format("%Y%m%d%H%M%S")),
            trained_at: Utc::now(),
            seed: training.seed,
            n_training_samples: dataset.n_samples,
            n_failure_samples: dataset.failure_count(),
            n_features: dataset.n_features,
            feature_names: dataset.feature_names.clone(),
            metrics: failure.metrics().clone(),
            hyperparameters: HashMap::from([
                ("anomaly_trees".to_string(), training.anomaly.n_trees.to_string()),
                ("failure_trees".to_string(), training.failure.n_trees.to_string()),
                ("max_depth".to_string(), training.failure.max_depth.to_string()),
            ]),
        };

        handle.checkpoint("activation")?;
        let checksum = ModelArtifact::checksum_of(&dataset);
        self.registry.activate(ActiveModel {
            metadata: metadata.clone(),
            anomaly,
            failure,
            activated_at: Utc::now(),
        });
        let artifact = self.registry.artifact(equipment_type, checksum)?;
        self.store.save_artifact(&artifact).await?;

        Ok(metadata)
    }

    /// Retrain one equipment type on a background task
    ///
    /// The returned handle cancels the run; the join handle yields the
    /// training outcome.
    pub fn spawn_retrain(
        self: &Arc<Self>,
        equipment_type: EquipmentType,
    ) -> (RetrainHandle, tokio::task::JoinHandle<Result<ModelMetadata>>) {
        let handle = RetrainHandle::new();
        let engine = Arc::clone(self);
        let task_handle = handle.clone();
        let join =
            tokio::spawn(async move { engine.retrain(equipment_type, &task_handle).await });
        (handle, join)
    }

    /// Retrain every equipment type that has registered equipment
    ///
    /// Types without enough data are skipped, not errors.
    pub async fn retrain_all(&self, handle: &RetrainHandle) -> Result<Vec<ModelMetadata>> {
        let mut types: Vec<EquipmentType> = self
            .store
            .list_equipment()
            .await?
            .into_iter()
            .map(|p| p.equipment_type)
            .collect();
        types.sort_by_key(|t| t.to_string());
        types.dedup();

        let mut trained = Vec::new();
        for equipment_type in types {
            match self.retrain(equipment_type, handle).await {
                Ok(metadata) => trained.push(metadata),
                Err(EngineError::InsufficientData(reason)) => {
                    info!(%equipment_type, %reason, "Skipping retrain");
                }
                Err(e @ EngineError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    warn!(%equipment_type, error = %e, "Retrain failed");
                }
            }
        }
        Ok(trained)
    }

    /// Assemble labeled snapshots from the stored history of one type
    ///
    /// Snapshots are taken at window strides over the lookback period; a
    /// snapshot is labeled failed when a corrective visit follows within
    /// the label horizon.
    async fn build_dataset(&self, equipment_type: EquipmentType) -> Result<TrainingDataset> {
        let training = &self.config.training;
        let now = Utc::now();
        let lookback_start = now - Duration::days(training.lookback_days as i64);
        let stride = Duration::hours(self.config.features.window_hours as i64);
        let horizon = Duration::hours(training.label_horizon_hours as i64);

        let equipment: Vec<EquipmentProfile> = self
            .store
            .list_equipment()
            .await?
            .into_iter()
            .filter(|p| p.equipment_type == equipment_type)
            .collect();

        let mut examples = Vec::new();
        for profile in &equipment {
            let readings = self
                .store
                .readings_since(&profile.id, lookback_start)
                .await?;
            let maintenance = self
                .store
                .maintenance_since(&profile.id, lookback_start - Duration::days(365))
                .await?;
            let corrective: Vec<DateTime<Utc>> = maintenance
                .iter()
                .filter(|m| m.kind == MaintenanceKind::Corrective)
                .map(|m| m.performed_at)
                .collect();

            let mut snapshot = lookback_start + stride;
            while snapshot <= now {
                match self
                    .extractor
                    .extract(profile, &readings, &maintenance, snapshot)
                {
                    Ok(features) => {
                        let failure_at = corrective
                            .iter()
                            .filter(|&&at| at > snapshot && at - snapshot <= horizon)
                            .min();
                        match failure_at {
                            Some(&at) => {
                                let hours = (at - snapshot).num_minutes() as f64 / 60.0;
                                examples.push(TrainingExample::failed(features.values, hours));
                            }
                            None => examples.push(TrainingExample::healthy(features.values)),
                        }
                    }
                    // Sparse stretches simply contribute no snapshot
                    Err(EngineError::InsufficientData(_)) => {}
                    Err(e) => return Err(e),
                }
                snapshot = snapshot + stride;
            }
        }

        TrainingDataset::from_examples(&examples, FeatureExtractor::feature_names())
    }
}
