use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_test::assert_ok;
use uuid::Uuid;

use predictive_maintenance_engine::config::Config;
use predictive_maintenance_engine::engine::{MaintenanceEngine, RetrainHandle};
use predictive_maintenance_engine::error::{EngineError, Result};
use predictive_maintenance_engine::ml::anomaly::AnomalyDetector;
use predictive_maintenance_engine::ml::{
    FailurePredictor, FeatureExtractor, ModelArtifact, TrainingDataset, TrainingExample,
};
use predictive_maintenance_engine::models::{
    CriticalityTier, EquipmentProfile, EquipmentType, Incident, IncidentSignals, IncidentStatus,
    MaintenanceKind, MaintenanceRecord, PredictionResult, Priority, ProductionImpact,
    SensorChannel, SensorReading, SkillLevel, Specialty, Technician,
};
use predictive_maintenance_engine::state::{EngineStore, IncidentFilter, InMemoryStore};

fn test_config() -> Config {
    config::Config::builder()
        .add_source(config::File::from_str(
            include_str!("../config/default.toml"),
            config::FileFormat::Toml,
        ))
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap()
}

fn engine() -> MaintenanceEngine {
    MaintenanceEngine::new(test_config(), Arc::new(InMemoryStore::new()))
}

fn reading(
    equipment_id: Uuid,
    at: DateTime<Utc>,
    temp: f64,
    vibration: f64,
    current: f64,
) -> SensorReading {
    let channels: BTreeMap<SensorChannel, f64> = [
        (SensorChannel::Temperature, temp),
        (SensorChannel::Vibration, vibration),
        (SensorChannel::Current, current),
    ]
    .into_iter()
    .collect();
    SensorReading::new(equipment_id, at, channels)
}

fn technician(
    name: &str,
    specialties: Vec<Specialty>,
    experience_years: u32,
    active: u32,
) -> Technician {
    let mut t = Technician::new(name.to_string(), specialties, SkillLevel::Senior);
    t.experience_years = experience_years;
    t.active_assignments = active;
    t.max_assignments = 5;
    t
}

/// Six recent readings so the feature window clears the minimum
async fn seed_recent_readings(
    store: &dyn EngineStore,
    equipment_id: Uuid,
    temp: f64,
    vibration: f64,
    current: f64,
) {
    let now = Utc::now();
    for i in 0..6 {
        let r = reading(
            equipment_id,
            now - Duration::hours(2 * i),
            temp,
            vibration,
            current,
        );
        store.save_reading(&r).await.unwrap();
    }
}

/// Half a year of pump history: cool baseline readings, with a hot stretch
/// ahead of every corrective visit so failures are learnable
async fn seed_training_history(store: &dyn EngineStore, equipment_id: Uuid) {
    let now = Utc::now();
    let start = now - Duration::days(180);

    let correctives: Vec<DateTime<Utc>> =
        (1..=15).map(|k| start + Duration::days(12 * k)).collect();
    for &at in &correctives {
        let record = MaintenanceRecord::new(equipment_id, at, MaintenanceKind::Corrective);
        store.save_maintenance(&record).await.unwrap();
    }

    let mut at = start;
    while at <= now {
        let hot = correctives
            .iter()
            .any(|&c| c > at && c - at >= Duration::days(1) && c - at < Duration::days(8));
        let r = if hot {
            reading(equipment_id, at, 90.0, 5.0, 18.5)
        } else {
            reading(equipment_id, at, 60.0, 2.0, 12.0)
        };
        store.save_reading(&r).await.unwrap();
        at = at + Duration::hours(4);
    }
}

/// Half a year of quiet history with no failures
async fn seed_healthy_history(store: &dyn EngineStore, equipment_id: Uuid) {
    let now = Utc::now();
    let mut at = now - Duration::days(180);
    while at <= now {
        let r = reading(equipment_id, at, 60.0, 2.0, 12.0);
        store.save_reading(&r).await.unwrap();
        at = at + Duration::hours(4);
    }
}

#[tokio::test]
async fn test_assignment_prefers_exact_specialty_over_complementary() {
    let engine = engine();
    let motor = EquipmentProfile::new(
        "Conveyor drive motor".to_string(),
        EquipmentType::Motor,
        CriticalityTier::Medium,
    );
    let motor_id = engine.register_equipment(motor).await.unwrap();
    seed_recent_readings(engine.store().as_ref(), motor_id, 70.0, 3.0, 14.0).await;

    // Scenario from the matcher weight formula: exact mechanical at 2/5
    // load beats electrical partial credit at 1/5 load
    let mech = technician("Carlos Mendoza", vec![Specialty::Mechanical], 5, 2);
    let elec = technician("Rosa Flores", vec![Specialty::Electrical], 4, 1);
    engine.register_technician(mech).await.unwrap();
    engine.register_technician(elec).await.unwrap();

    let incident = engine
        .raise_incident(
            motor_id,
            "Bearing vibration above limit".to_string(),
            ProductionImpact::None,
        )
        .await
        .unwrap();
    assert_eq!(incident.required_specialties, vec![Specialty::Mechanical]);

    let ranked = engine.recommend_technicians(incident.id, 10).await.unwrap();
    assert_eq!(ranked[0].technician_name, "Carlos Mendoza");
    // 0.4 + 0.3*(1 - 2/5) + 0.2*(5/10) + 0.1*0.5 = 0.73
    assert!((ranked[0].score - 0.73).abs() < 1e-9);
    // 0.4*0.5 + 0.3*(1 - 1/5) + 0.2*(4/10) + 0.1*0.5 = 0.57
    assert!((ranked[1].score - 0.57).abs() < 1e-9);

    let top_only = engine.recommend_technicians(incident.id, 1).await.unwrap();
    assert_eq!(top_only.len(), 1);

    let assigned = engine.assign_technician(incident.id).await.unwrap();
    assert_eq!(assigned.status, IncidentStatus::InProgress);
    assert_eq!(
        assigned.assignment.unwrap().technician_name,
        "Carlos Mendoza"
    );
}

#[tokio::test]
async fn test_electrical_incident_with_mechanical_only_roster_fails() {
    let engine = engine();
    let motor = EquipmentProfile::new(
        "Mill motor".to_string(),
        EquipmentType::Motor,
        CriticalityTier::High,
    );
    let motor_id = engine.register_equipment(motor).await.unwrap();
    seed_recent_readings(engine.store().as_ref(), motor_id, 70.0, 3.0, 14.0).await;

    engine
        .register_technician(technician("Mech", vec![Specialty::Mechanical], 8, 0))
        .await
        .unwrap();

    // Mechanical does not cover electrical work
    let incident = engine
        .raise_incident(
            motor_id,
            "Breaker trips under load".to_string(),
            ProductionImpact::Reduced,
        )
        .await
        .unwrap();
    assert_eq!(incident.required_specialties, vec![Specialty::Electrical]);

    let result = engine.assign_technician(incident.id).await;
    assert!(matches!(
        result,
        Err(EngineError::NoAvailableTechnician(_))
    ));

    // Recommendation surfaces the same escalation instead of an empty list
    let result = engine.recommend_technicians(incident.id, 10).await;
    assert!(matches!(
        result,
        Err(EngineError::NoAvailableTechnician(_))
    ));
}

#[tokio::test]
async fn test_recommendation_with_empty_roster_escalates() {
    let engine = engine();
    let pump = EquipmentProfile::new(
        "Sump pump".to_string(),
        EquipmentType::Pump,
        CriticalityTier::Low,
    );
    let pump_id = engine.register_equipment(pump).await.unwrap();
    seed_recent_readings(engine.store().as_ref(), pump_id, 60.0, 2.0, 12.0).await;

    let incident = engine
        .raise_incident(
            pump_id,
            "Impeller wear suspected".to_string(),
            ProductionImpact::None,
        )
        .await
        .unwrap();

    let result = engine.recommend_technicians(incident.id, 10).await;
    assert!(matches!(
        result,
        Err(EngineError::NoAvailableTechnician(_))
    ));
}

#[tokio::test]
async fn test_retrain_then_predict_overheating_pump() {
    let engine = engine();
    let store = engine.store();

    let failing = EquipmentProfile::new(
        "Slurry pump A".to_string(),
        EquipmentType::Pump,
        CriticalityTier::High,
    );
    let failing_id = engine.register_equipment(failing).await.unwrap();
    seed_training_history(store.as_ref(), failing_id).await;

    let healthy = EquipmentProfile::new(
        "Slurry pump B".to_string(),
        EquipmentType::Pump,
        CriticalityTier::High,
    );
    let healthy_id = engine.register_equipment(healthy).await.unwrap();
    seed_healthy_history(store.as_ref(), healthy_id).await;

    let handle = RetrainHandle::new();
    let metadata = assert_ok!(engine.retrain(EquipmentType::Pump, &handle).await);
    assert!(metadata.n_training_samples >= 100);
    assert!(metadata.n_failure_samples > 0);

    // A third pump running hot, the overheating signature the model learned
    let subject = EquipmentProfile::new(
        "Slurry pump C".to_string(),
        EquipmentType::Pump,
        CriticalityTier::High,
    );
    let subject_id = engine.register_equipment(subject).await.unwrap();
    seed_recent_readings(store.as_ref(), subject_id, 85.5, 4.2, 18.5).await;

    let prediction = engine.predict(subject_id).await.unwrap();
    assert!(!prediction.fallback_derived);
    assert_eq!(prediction.model_version.as_deref(), Some(metadata.version.as_str()));
    assert!(prediction.failure.probability >= 0.5);
    assert!(prediction.failure.time_to_failure.is_some());
    assert!(prediction.anomaly.score >= 0.0 && prediction.anomaly.score <= 1.0);

    // The stored artifact records the training provenance
    let artifact = store
        .get_artifact(EquipmentType::Pump)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.metadata.version, metadata.version);
    assert_eq!(artifact.metadata.seed, 42);
}

#[tokio::test]
async fn test_staged_operations_agree_with_the_full_pass() {
    let engine = Arc::new(engine());
    let store = engine.store();

    let failing = EquipmentProfile::new(
        "Ball mill feed pump".to_string(),
        EquipmentType::Pump,
        CriticalityTier::High,
    );
    let failing_id = engine.register_equipment(failing).await.unwrap();
    seed_training_history(store.as_ref(), failing_id).await;

    let (_cancel, join) = engine.spawn_retrain(EquipmentType::Pump);
    let metadata = join.await.unwrap().unwrap();
    assert!(metadata.n_training_samples >= 100);

    let subject = EquipmentProfile::new(
        "Ball mill discharge pump".to_string(),
        EquipmentType::Pump,
        CriticalityTier::High,
    );
    let subject_id = engine.register_equipment(subject).await.unwrap();
    seed_recent_readings(store.as_ref(), subject_id, 88.0, 4.8, 18.5).await;

    let features = engine.extract_features(subject_id).await.unwrap();
    let anomaly = engine.score_anomaly(&features).unwrap();
    let failure = engine.predict_failure(&features).unwrap();
    assert!(anomaly.score >= 0.0 && anomaly.score <= 1.0);
    assert!(failure.probability >= 0.5);

    // The staged calls and the recorded pass use the same active model
    let health = engine.assess_health(subject_id).await.unwrap();
    assert!((health.failure_component - 0.5 * failure.probability).abs() < 0.05);
    assert!(health.risk_score >= 0.0 && health.risk_score <= 1.0);

    let decision = engine.classify_priority(
        &IncidentSignals {
            risk_score: health.risk_score,
            anomaly_detected: anomaly.is_anomaly,
            failure_probability: failure.probability,
            criticality: CriticalityTier::High,
            production_impact: ProductionImpact::None,
            fallback_derived: false,
        },
        "Pump casing running hot",
        EquipmentType::Pump,
    );
    assert!(decision.priority >= Priority::Medium);
    assert!(!decision.low_confidence);
    assert_eq!(decision.required_specialties, vec![Specialty::Mechanical]);
}

#[tokio::test]
async fn test_untrained_type_falls_back_and_tags_result() {
    let engine = engine();
    let motor = EquipmentProfile::new(
        "Backup generator motor".to_string(),
        EquipmentType::Motor,
        CriticalityTier::Medium,
    );
    let motor_id = engine.register_equipment(motor).await.unwrap();
    seed_recent_readings(engine.store().as_ref(), motor_id, 60.0, 2.0, 12.0).await;

    assert!(matches!(
        engine.registry().get(EquipmentType::Motor),
        Err(EngineError::ModelNotTrained(_))
    ));

    let prediction = engine.predict(motor_id).await.unwrap();
    assert!(prediction.fallback_derived);
    assert!(prediction.model_version.is_none());
    assert!(prediction.failure.time_to_failure.is_none());
    assert!(prediction.failure.confidence < 0.5);

    // Quiet fallback signals classify as medium with a low-confidence marker
    let incident = engine
        .raise_incident(
            motor_id,
            "Operator reported intermittent noise".to_string(),
            ProductionImpact::None,
        )
        .await
        .unwrap();
    assert_eq!(incident.priority, Priority::Medium);
    assert_eq!(incident.priority_rule, "ambiguous-signals");
    assert!(incident.low_confidence);
    assert!(incident.signals.fallback_derived);
}

#[tokio::test]
async fn test_workload_counter_tracks_open_incidents() {
    let engine = engine();
    let store = engine.store();
    let crusher = EquipmentProfile::new(
        "Jaw crusher".to_string(),
        EquipmentType::Crusher,
        CriticalityTier::Critical,
    );
    let crusher_id = engine.register_equipment(crusher).await.unwrap();
    seed_recent_readings(store.as_ref(), crusher_id, 70.0, 3.5, 15.0).await;

    let tech = technician("Ana Quispe", vec![Specialty::Mechanical], 10, 0);
    let tech_id = engine.register_technician(tech).await.unwrap();

    let first = engine
        .raise_incident(
            crusher_id,
            "Gearbox noise on startup".to_string(),
            ProductionImpact::None,
        )
        .await
        .unwrap();
    let second = engine
        .raise_incident(
            crusher_id,
            "Belt alignment drifting".to_string(),
            ProductionImpact::None,
        )
        .await
        .unwrap();

    engine.assign_technician(first.id).await.unwrap();
    engine.assign_technician(second.id).await.unwrap();
    let stored = store.get_technician(&tech_id).await.unwrap().unwrap();
    assert_eq!(stored.active_assignments, 2);

    engine
        .update_incident_status(first.id, IncidentStatus::Resolved)
        .await
        .unwrap();
    let stored = store.get_technician(&tech_id).await.unwrap().unwrap();
    assert_eq!(stored.active_assignments, 1);

    engine
        .update_incident_status(second.id, IncidentStatus::Cancelled)
        .await
        .unwrap();
    let stored = store.get_technician(&tech_id).await.unwrap().unwrap();
    assert_eq!(stored.active_assignments, 0);

    let resolved = store.get_incident(&first.id).await.unwrap().unwrap();
    assert!(resolved.resolved_at.is_some());
}

#[tokio::test]
async fn test_invalid_status_transition_is_rejected() {
    let engine = engine();
    let pump = EquipmentProfile::new(
        "Dewatering pump".to_string(),
        EquipmentType::Pump,
        CriticalityTier::Low,
    );
    let pump_id = engine.register_equipment(pump).await.unwrap();
    seed_recent_readings(engine.store().as_ref(), pump_id, 60.0, 2.0, 12.0).await;

    let incident = engine
        .raise_incident(
            pump_id,
            "Seal inspection due".to_string(),
            ProductionImpact::None,
        )
        .await
        .unwrap();

    // Pending incidents cannot jump straight to resolved
    let result = engine
        .update_incident_status(incident.id, IncidentStatus::Resolved)
        .await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidStateTransition(_))
    ));
}

#[tokio::test]
async fn test_retrain_without_data_and_after_cancel() {
    let engine = engine();
    let handle = RetrainHandle::new();

    let result = engine.retrain(EquipmentType::Generator, &handle).await;
    assert!(matches!(result, Err(EngineError::InsufficientData(_))));

    handle.cancel();
    let result = engine.retrain(EquipmentType::Generator, &handle).await;
    assert!(matches!(result, Err(EngineError::Cancelled(_))));
}

#[test]
fn test_seeded_training_is_idempotent() {
    let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let mut examples = Vec::new();
    for i in 0..60 {
        let x = i as f64;
        examples.push(TrainingExample::healthy(vec![60.0 + x * 0.1, 2.0, 12.0]));
        examples.push(TrainingExample::failed(
            vec![90.0 + x * 0.1, 5.0, 18.5],
            48.0,
        ));
    }
    let dataset = TrainingDataset::from_examples(&examples, names).unwrap();

    let config = test_config().training;
    let point = [87.0, 4.5, 18.0];

    let anomaly_a = AnomalyDetector::train(&dataset.features, &config.anomaly, config.seed).unwrap();
    let anomaly_b = AnomalyDetector::train(&dataset.features, &config.anomaly, config.seed).unwrap();
    let score_a = anomaly_a.assess(&point).unwrap().score;
    let score_b = anomaly_b.assess(&point).unwrap().score;
    assert!((score_a - score_b).abs() < 1e-12);

    let failure_a = FailurePredictor::train(&dataset, &config.failure, config.seed).unwrap();
    let failure_b = FailurePredictor::train(&dataset, &config.failure, config.seed).unwrap();
    let prob_a = failure_a.predict(&point).unwrap().probability;
    let prob_b = failure_b.predict(&point).unwrap().probability;
    assert!((prob_a - prob_b).abs() < 1e-12);
}

/// Store that can be told to refuse incident updates
struct FailingUpdateStore {
    inner: InMemoryStore,
    fail_updates: AtomicBool,
}

impl FailingUpdateStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_updates: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EngineStore for FailingUpdateStore {
    async fn save_equipment(&self, profile: &EquipmentProfile) -> Result<()> {
        self.inner.save_equipment(profile).await
    }
    async fn get_equipment(&self, id: &Uuid) -> Result<Option<EquipmentProfile>> {
        self.inner.get_equipment(id).await
    }
    async fn list_equipment(&self) -> Result<Vec<EquipmentProfile>> {
        self.inner.list_equipment().await
    }
    async fn save_reading(&self, reading: &SensorReading) -> Result<()> {
        self.inner.save_reading(reading).await
    }
    async fn readings_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        self.inner.readings_since(equipment_id, since).await
    }
    async fn save_maintenance(&self, record: &MaintenanceRecord) -> Result<()> {
        self.inner.save_maintenance(record).await
    }
    async fn maintenance_since(
        &self,
        equipment_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>> {
        self.inner.maintenance_since(equipment_id, since).await
    }
    async fn save_technician(&self, technician: &Technician) -> Result<()> {
        self.inner.save_technician(technician).await
    }
    async fn get_technician(&self, id: &Uuid) -> Result<Option<Technician>> {
        self.inner.get_technician(id).await
    }
    async fn list_technicians(&self) -> Result<Vec<Technician>> {
        self.inner.list_technicians().await
    }
    async fn save_incident(&self, incident: &Incident) -> Result<()> {
        self.inner.save_incident(incident).await
    }
    async fn get_incident(&self, id: &Uuid) -> Result<Option<Incident>> {
        self.inner.get_incident(id).await
    }
    async fn update_incident(&self, incident: &Incident) -> Result<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(EngineError::Storage("simulated write failure".to_string()));
        }
        self.inner.update_incident(incident).await
    }
    async fn list_incidents(
        &self,
        filter: &IncidentFilter,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Incident>> {
        self.inner.list_incidents(filter, page, page_size).await
    }
    async fn append_prediction(&self, prediction: &PredictionResult) -> Result<()> {
        self.inner.append_prediction(prediction).await
    }
    async fn predictions_for(
        &self,
        equipment_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<PredictionResult>> {
        self.inner.predictions_for(equipment_id, limit).await
    }
    async fn save_artifact(&self, artifact: &ModelArtifact) -> Result<()> {
        self.inner.save_artifact(artifact).await
    }
    async fn get_artifact(&self, equipment_type: EquipmentType) -> Result<Option<ModelArtifact>> {
        self.inner.get_artifact(equipment_type).await
    }
}

#[tokio::test]
async fn test_failed_assignment_write_releases_the_reservation() {
    let store = Arc::new(FailingUpdateStore::new());
    let engine = MaintenanceEngine::new(test_config(), store.clone());

    let crusher = EquipmentProfile::new(
        "Cone crusher".to_string(),
        EquipmentType::Crusher,
        CriticalityTier::Medium,
    );
    let crusher_id = engine.register_equipment(crusher).await.unwrap();
    seed_recent_readings(store.as_ref(), crusher_id, 70.0, 3.0, 14.0).await;

    let mut tech = technician("Sole Mechanic", vec![Specialty::Mechanical], 6, 0);
    tech.max_assignments = 1;
    let tech_id = engine.register_technician(tech).await.unwrap();

    let incident = engine
        .raise_incident(
            crusher_id,
            "Gearbox noise on startup".to_string(),
            ProductionImpact::None,
        )
        .await
        .unwrap();

    store.fail_updates.store(true, Ordering::SeqCst);
    let result = engine.assign_technician(incident.id).await;
    assert!(matches!(result, Err(EngineError::Storage(_))));

    // The write never landed and the reserved slot was given back
    let stored = store.get_incident(&incident.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IncidentStatus::Pending);

    store.fail_updates.store(false, Ordering::SeqCst);
    let assigned = engine.assign_technician(incident.id).await.unwrap();
    assert_eq!(
        assigned.assignment.as_ref().unwrap().technician_id,
        tech_id
    );
    assert_eq!(assigned.status, IncidentStatus::InProgress);
}

#[test]
fn test_feature_schema_is_stable() {
    let names = FeatureExtractor::feature_names();
    assert_eq!(names.len(), FeatureExtractor::n_features());
    assert_eq!(names[0], "age_months");
}
