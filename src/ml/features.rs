use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::debug;

use crate::config::FeatureConfig;
use crate::error::{EngineError, Result};
use crate::models::{
    EquipmentProfile, FeatureVector, ImputationSource, MaintenanceRecord, SensorChannel,
    SensorReading,
};

/// Per-channel statistics computed over the input window
const CHANNEL_STATS: [&str; 4] = ["mean", "std", "max", "min"];

/// Static per-channel defaults used when a channel was never observed
fn channel_default(channel: SensorChannel) -> f64 {
    match channel {
        SensorChannel::Temperature => 60.0,
        SensorChannel::Vibration => 2.0,
        SensorChannel::Pressure => 100.0,
        SensorChannel::Humidity => 50.0,
        SensorChannel::Voltage => 380.0,
        SensorChannel::Current => 50.0,
    }
}

/// Computes the ordered feature vector the models consume
///
/// The schema is fixed: three profile features followed by
/// mean/std/max/min for every sensor channel, in channel order.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// The feature names, in the order values are emitted
    pub fn feature_names() -> Vec<String> {
        let mut names = vec![
            "age_months".to_string(),
            "operating_hours".to_string(),
            "maintenance_frequency".to_string(),
        ];
        for channel in SensorChannel::iter() {
            for stat in CHANNEL_STATS {
                names.push(format!("{}_{}", channel, stat));
            }
        }
        names
    }

    pub fn n_features() -> usize {
        3 + SensorChannel::iter().count() * CHANNEL_STATS.len()
    }

    /// Extract features for one piece of equipment at a reference time
    ///
    /// Only readings inside the sliding window feed the statistics. A channel
    /// with no in-window observation falls back to its last known value from
    /// older readings, then to a static per-channel typical value, and the
    /// fallback used is recorded in the audit map.
    pub fn extract(
        &self,
        profile: &EquipmentProfile,
        readings: &[SensorReading],
        maintenance: &[MaintenanceRecord],
        as_of: DateTime<Utc>,
    ) -> Result<FeatureVector> {
        let window_start = as_of - Duration::hours(self.config.window_hours as i64);
        let in_window: Vec<&SensorReading> = readings
            .iter()
            .filter(|r| r.equipment_id == profile.id)
            .filter(|r| r.timestamp >= window_start && r.timestamp <= as_of)
            .collect();

        if in_window.len() < self.config.min_readings {
            return Err(EngineError::InsufficientData(format!(
                "Equipment {} has {} readings in the window, {} required",
                profile.id,
                in_window.len(),
                self.config.min_readings
            )));
        }

        let mut names = Vec::with_capacity(Self::n_features());
        let mut values = Vec::with_capacity(Self::n_features());
        let mut imputed = BTreeMap::new();

        names.push("age_months".to_string());
        values.push(profile.age_months as f64);
        names.push("operating_hours".to_string());
        values.push(profile.operating_hours);
        names.push("maintenance_frequency".to_string());
        values.push(Self::maintenance_frequency(profile, maintenance, as_of));

        for channel in SensorChannel::iter() {
            let observed: Vec<f64> = in_window
                .iter()
                .filter_map(|r| r.channel(channel))
                .collect();

            let (stats, source) = if !observed.is_empty() {
                (Self::channel_stats(&observed), None)
            } else if let Some(last) = Self::last_known(readings, profile, channel, window_start) {
                ([last, 0.0, last, last], Some(ImputationSource::LastKnownValue))
            } else {
                let fallback = channel_default(channel);
                (
                    [fallback, 0.0, fallback, fallback],
                    Some(ImputationSource::TypeMean),
                )
            };

            for (stat, value) in CHANNEL_STATS.iter().zip(stats) {
                let name = format!("{}_{}", channel, stat);
                if let Some(source) = source {
                    imputed.insert(name.clone(), source);
                }
                names.push(name);
                values.push(value);
            }
        }

        debug!(
            equipment_id = %profile.id,
            readings = in_window.len(),
            imputed = imputed.len(),
            "Extracted feature vector"
        );

        Ok(FeatureVector {
            equipment_id: profile.id,
            equipment_type: profile.equipment_type,
            computed_at: as_of,
            names,
            values,
            imputed,
        })
    }

    /// Most recent value for the channel among readings before the window
    fn last_known(
        readings: &[SensorReading],
        profile: &EquipmentProfile,
        channel: SensorChannel,
        window_start: DateTime<Utc>,
    ) -> Option<f64> {
        readings
            .iter()
            .filter(|r| r.equipment_id == profile.id && r.timestamp < window_start)
            .filter_map(|r| r.channel(channel).map(|v| (r.timestamp, v)))
            .max_by_key(|(ts, _)| *ts)
            .map(|(_, v)| v)
    }

    fn channel_stats(observed: &[f64]) -> [f64; 4] {
        let n = observed.len() as f64;
        let mean = observed.iter().sum::<f64>() / n;
        let variance = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let max = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = observed.iter().copied().fold(f64::INFINITY, f64::min);
        [mean, std, max, min]
    }

    /// Maintenance visits per month over the trailing year
    fn maintenance_frequency(
        profile: &EquipmentProfile,
        maintenance: &[MaintenanceRecord],
        as_of: DateTime<Utc>,
    ) -> f64 {
        let year_start = as_of - Duration::days(365);
        let visits = maintenance
            .iter()
            .filter(|m| m.equipment_id == profile.id)
            .filter(|m| m.performed_at >= year_start && m.performed_at <= as_of)
            .count();
        visits as f64 / 12.0
    }
}
