use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

use crate::models::{
    CriticalityTier, EquipmentType, IncidentSignals, Priority, ProductionImpact, Specialty,
};

/// A priority verdict with the identifier of the rule that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityDecision {
    pub priority: Priority,
    pub rule: String,

    /// Trades the incident calls for, from description cues or the
    /// equipment-type default
    pub required_specialties: Vec<Specialty>,

    /// Set when the verdict rests on fallback-derived or otherwise weak signals
    pub low_confidence: bool,
}

struct Rule {
    tag: &'static str,
    priority: Priority,
    applies: fn(&IncidentSignals) -> bool,
}

/// Ordered decision table; the first matching rule wins
const RULES: &[Rule] = &[
    Rule {
        tag: "production-stopped",
        priority: Priority::Critical,
        applies: |s| s.production_impact == ProductionImpact::Stopped,
    },
    Rule {
        tag: "imminent-failure-critical-equipment",
        priority: Priority::Critical,
        applies: |s| s.failure_probability >= 0.7 && s.criticality >= CriticalityTier::High,
    },
    Rule {
        tag: "failure-probability-high",
        priority: Priority::High,
        applies: |s| s.failure_probability >= 0.7,
    },
    Rule {
        tag: "risk-critical",
        priority: Priority::High,
        applies: |s| s.risk_score >= 0.8,
    },
    Rule {
        tag: "anomaly-on-critical-equipment",
        priority: Priority::High,
        applies: |s| s.anomaly_detected && s.criticality == CriticalityTier::Critical,
    },
    Rule {
        tag: "production-reduced",
        priority: Priority::Medium,
        applies: |s| s.production_impact == ProductionImpact::Reduced,
    },
    Rule {
        tag: "risk-elevated",
        priority: Priority::Medium,
        applies: |s| s.risk_score >= 0.55 || s.failure_probability >= 0.4,
    },
    Rule {
        tag: "anomaly-observed",
        priority: Priority::Medium,
        applies: |s| s.anomaly_detected,
    },
];

const DEFAULT_RULE: &str = "routine";
const AMBIGUOUS_RULE: &str = "ambiguous-signals";

/// Trade usually needed for each equipment class
fn default_specialty(equipment_type: EquipmentType) -> Specialty {
    match equipment_type {
        EquipmentType::Motor | EquipmentType::Generator => Specialty::Electrical,
        EquipmentType::Compressor => Specialty::Pneumatic,
        EquipmentType::Pump | EquipmentType::Crusher | EquipmentType::Conveyor => {
            Specialty::Mechanical
        }
    }
}

/// Derive the set of required trades from fault-description keywords
///
/// Every trade whose keywords appear in the description qualifies; the
/// equipment-type default applies when no keyword matches at all.
fn infer_specialties(description: &str, fallback: Specialty) -> Vec<Specialty> {
    static PATTERNS: OnceLock<Vec<(Regex, Specialty)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            (r"(?i)\b(hydraulic|cylinder|hose|oil leak)\b", Specialty::Hydraulic),
            (r"(?i)\b(pneumatic|air line|valve stuck)\b", Specialty::Pneumatic),
            (r"(?i)\b(plc|hmi|controller|display|board)\b", Specialty::Electronics),
            (
                r"(?i)\b(voltage|current|breaker|winding|short circuit|electrical)\b",
                Specialty::Electrical,
            ),
            (
                r"(?i)\b(calibration|transmitter|gauge|instrument)\b",
                Specialty::Instrumentation,
            ),
            (
                r"(?i)\b(bearing|vibration|gearbox|coupling|shaft|belt|alignment)\b",
                Specialty::Mechanical,
            ),
        ]
        .into_iter()
        .map(|(pattern, specialty)| (Regex::new(pattern).expect("valid pattern"), specialty))
        .collect()
    });

    let matched: Vec<Specialty> = patterns
        .iter()
        .filter(|(regex, _)| regex.is_match(description))
        .map(|(_, specialty)| *specialty)
        .collect();
    if matched.is_empty() {
        vec![fallback]
    } else {
        matched
    }
}

/// Classifies incident priority from the evidence bundle
///
/// Every verdict is tagged with the rule that produced it so the decision
/// can be audited later. Signals the models could not fully back, such as
/// a fallback-derived probability with no rule firing, default to medium
/// rather than low and carry a low-confidence marker.
#[derive(Debug, Clone, Default)]
pub struct PriorityClassifier;

impl PriorityClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(
        &self,
        signals: &IncidentSignals,
        description: &str,
        equipment_type: EquipmentType,
    ) -> PriorityDecision {
        let required_specialties =
            infer_specialties(description, default_specialty(equipment_type));

        for rule in RULES {
            if (rule.applies)(signals) {
                debug!(rule = rule.tag, priority = %rule.priority, "Priority rule matched");
                return PriorityDecision {
                    priority: rule.priority,
                    rule: rule.tag.to_string(),
                    required_specialties,
                    low_confidence: signals.fallback_derived,
                };
            }
        }

        if signals.fallback_derived {
            return PriorityDecision {
                priority: Priority::Medium,
                rule: AMBIGUOUS_RULE.to_string(),
                required_specialties,
                low_confidence: true,
            };
        }

        PriorityDecision {
            priority: Priority::Low,
            rule: DEFAULT_RULE.to_string(),
            required_specialties,
            low_confidence: false,
        }
    }
}
