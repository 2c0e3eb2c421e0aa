use tracing::debug;
use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::models::{
    AnomalyAssessment, CriticalityTier, FailurePrediction, HealthAssessment, RiskTier,
};

/// Combines model outputs and equipment criticality into one risk score
///
/// The composite is a weighted sum of three components, each in [0, 1]
/// with higher meaning more at-risk. Bands are cut at fixed breakpoints.
#[derive(Debug, Clone)]
pub struct HealthScorer {
    config: ScoringConfig,
}

impl HealthScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Compute the composite risk assessment
    pub fn score(
        &self,
        equipment_id: Uuid,
        criticality: CriticalityTier,
        anomaly: &AnomalyAssessment,
        failure: &FailurePrediction,
    ) -> HealthAssessment {
        let weights = &self.config.weights;

        let failure_component = weights.failure * failure.probability;
        let anomaly_component = weights.anomaly * anomaly.score;
        let criticality_component = weights.criticality * criticality.weight();

        let risk_score =
            (failure_component + anomaly_component + criticality_component).clamp(0.0, 1.0);
        let tier = self.tier_for(risk_score);

        debug!(
            equipment_id = %equipment_id,
            risk_score,
            tier = %tier,
            "Computed risk score"
        );

        HealthAssessment {
            risk_score,
            tier,
            failure_component,
            anomaly_component,
            criticality_component,
        }
    }

    /// Map a risk score to its band using the configured breakpoints
    pub fn tier_for(&self, risk_score: f64) -> RiskTier {
        let bp = &self.config.breakpoints;
        if risk_score < bp.medium {
            RiskTier::Low
        } else if risk_score < bp.high {
            RiskTier::Medium
        } else if risk_score < bp.critical {
            RiskTier::High
        } else {
            RiskTier::Critical
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> HealthScorer {
        HealthScorer::new(ScoringConfig::default())
    }

    fn anomaly(score: f64) -> AnomalyAssessment {
        AnomalyAssessment {
            score,
            raw_score: score,
            threshold: 0.6,
            is_anomaly: score >= 0.6,
        }
    }

    fn failure(probability: f64) -> FailurePrediction {
        FailurePrediction {
            probability,
            confidence: 0.9,
            time_to_failure: None,
        }
    }

    #[test]
    fn test_quiet_equipment_scores_low_risk() {
        let a = scorer().score(
            Uuid::new_v4(),
            CriticalityTier::Low,
            &anomaly(0.1),
            &failure(0.05),
        );
        assert!(a.risk_score < 0.3);
        assert_eq!(a.tier, RiskTier::Low);
    }

    #[test]
    fn test_failing_critical_equipment_scores_critical() {
        let a = scorer().score(
            Uuid::new_v4(),
            CriticalityTier::Critical,
            &anomaly(0.95),
            &failure(0.9),
        );
        assert!(a.risk_score > 0.8);
        assert_eq!(a.tier, RiskTier::Critical);
    }

    #[test]
    fn test_risk_is_monotonic_in_failure_probability() {
        let s = scorer();
        let mut prev = f64::NEG_INFINITY;
        for step in 0..=10 {
            let prob = step as f64 / 10.0;
            let risk = s
                .score(Uuid::nil(), CriticalityTier::Medium, &anomaly(0.2), &failure(prob))
                .risk_score;
            assert!(risk >= prev - 1e-12);
            prev = risk;
        }
    }

    #[test]
    fn test_risk_is_monotonic_in_criticality() {
        let s = scorer();
        let tiers = [
            CriticalityTier::Low,
            CriticalityTier::Medium,
            CriticalityTier::High,
            CriticalityTier::Critical,
        ];
        let mut prev = f64::NEG_INFINITY;
        for tier in tiers {
            let risk = s
                .score(Uuid::nil(), tier, &anomaly(0.4), &failure(0.3))
                .risk_score;
            assert!(risk > prev);
            prev = risk;
        }
    }

    #[test]
    fn test_tier_breakpoints() {
        let s = scorer();
        assert_eq!(s.tier_for(0.0), RiskTier::Low);
        assert_eq!(s.tier_for(0.29), RiskTier::Low);
        assert_eq!(s.tier_for(0.3), RiskTier::Medium);
        assert_eq!(s.tier_for(0.54), RiskTier::Medium);
        assert_eq!(s.tier_for(0.55), RiskTier::High);
        assert_eq!(s.tier_for(0.79), RiskTier::High);
        assert_eq!(s.tier_for(0.8), RiskTier::Critical);
        assert_eq!(s.tier_for(1.0), RiskTier::Critical);
    }

    #[test]
    fn test_component_breakdown_sums_to_score() {
        let a = scorer().score(
            Uuid::new_v4(),
            CriticalityTier::High,
            &anomaly(0.4),
            &failure(0.3),
        );
        let sum = a.failure_component + a.anomaly_component + a.criticality_component;
        assert!((a.risk_score - sum).abs() < 1e-9);
    }

    #[test]
    fn test_documented_weight_formula() {
        // 0.5 * 0.6 + 0.3 * 0.5 + 0.2 * 0.75
        let a = scorer().score(
            Uuid::new_v4(),
            CriticalityTier::High,
            &anomaly(0.5),
            &failure(0.6),
        );
        assert!((a.risk_score - 0.6).abs() < 1e-9);
        assert_eq!(a.tier, RiskTier::High);
    }
}
