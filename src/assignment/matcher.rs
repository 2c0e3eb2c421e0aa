use std::cmp::Ordering;
use tracing::debug;

use crate::config::MatcherConfig;
use crate::error::{EngineError, Result};
use crate::models::{AssignmentOutcome, Specialty, Technician};

/// Directed coverage map: a holder of the first specialty can also work
/// incidents requiring the second, at partial credit. Coverage is one-way;
/// a mechanical technician does not cover electrical work.
const COMPLEMENTARY_SPECIALTIES: &[(Specialty, Specialty)] = &[
    (Specialty::Electrical, Specialty::Mechanical),
    (Specialty::Hydraulic, Specialty::Mechanical),
    (Specialty::Pneumatic, Specialty::Mechanical),
    (Specialty::Electronics, Specialty::Electrical),
    (Specialty::Instrumentation, Specialty::Electronics),
];

fn covers(holder: Specialty, required: Specialty) -> bool {
    COMPLEMENTARY_SPECIALTIES
        .iter()
        .any(|&(h, r)| h == holder && r == required)
}

/// Ranks available technicians for an incident
///
/// Candidates with no exact or complementary specialty for any required
/// specialty are excluded outright. Technicians at capacity stay ranked
/// with a zero workload sub-score; capacity is re-checked at assignment
/// time. Ordering is total: score descending, then experience descending,
/// then active workload ascending, then id ascending. The same roster
/// always produces the same ranking.
#[derive(Debug, Clone)]
pub struct TechnicianMatcher {
    config: MatcherConfig,
}

impl TechnicianMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Score and rank every qualified candidate
    pub fn rank(
        &self,
        roster: &[Technician],
        required_specialties: &[Specialty],
        equipment_location: Option<&str>,
    ) -> Vec<AssignmentOutcome> {
        let mut candidates: Vec<(AssignmentOutcome, u32, u32)> = roster
            .iter()
            .filter(|t| t.available)
            .filter_map(|t| {
                let outcome = self.score(t, required_specialties, equipment_location)?;
                Some((outcome, t.experience_years, t.active_assignments))
            })
            .collect();

        candidates.sort_by(|(a, a_exp, a_load), (b, b_exp, b_load)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b_exp.cmp(a_exp))
                .then_with(|| a_load.cmp(b_load))
                .then_with(|| a.technician_id.cmp(&b.technician_id))
        });

        candidates.into_iter().map(|(o, _, _)| o).collect()
    }

    /// Pick the best candidate, or a typed error when nobody qualifies
    pub fn select(
        &self,
        roster: &[Technician],
        required_specialties: &[Specialty],
        equipment_location: Option<&str>,
    ) -> Result<AssignmentOutcome> {
        self.rank(roster, required_specialties, equipment_location)
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::NoAvailableTechnician(format!(
                    "No qualified technician for specialties [{}]",
                    required_specialties
                        .iter()
                        .map(|s| s.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }

    /// Returns None when the candidate has no specialty credit at all
    fn score(
        &self,
        technician: &Technician,
        required: &[Specialty],
        equipment_location: Option<&str>,
    ) -> Option<AssignmentOutcome> {
        let weights = &self.config.weights;
        let mut reasons = Vec::new();

        let mut specialty_score = 0.0f64;
        let mut specialty_reason = None;
        for &req in required {
            if technician.has_specialty(req) {
                specialty_score = weights.specialty;
                specialty_reason = Some(format!("specialty match: {}", req));
                break;
            }
            if specialty_score == 0.0 {
                if let Some(holder) = technician
                    .specialties
                    .iter()
                    .copied()
                    .find(|&s| covers(s, req))
                {
                    specialty_score = weights.specialty * self.config.partial_specialty_credit;
                    specialty_reason =
                        Some(format!("complementary specialty: {} covers {}", holder, req));
                }
            }
        }
        if specialty_score == 0.0 {
            return None;
        }
        if let Some(reason) = specialty_reason {
            reasons.push(reason);
        }

        let workload_score = weights.workload * technician.remaining_capacity();
        reasons.push(format!(
            "workload: {}/{} active",
            technician.active_assignments, technician.max_assignments
        ));

        let cap = self.config.experience_cap_years.max(1);
        let experience_score =
            weights.experience * (technician.experience_years.min(cap) as f64 / cap as f64);
        reasons.push(format!(
            "experience: {} years",
            technician.experience_years
        ));

        let location_score = match (technician.location.as_deref(), equipment_location) {
            (Some(a), Some(b)) if a == b => {
                reasons.push(format!("on-site at {}", a));
                weights.location
            }
            (Some(_), Some(_)) => 0.0,
            // Unknown on either side gets half credit rather than a penalty
            _ => weights.location * 0.5,
        };

        let score = specialty_score + workload_score + experience_score + location_score;
        debug!(
            technician = %technician.name,
            score,
            "Scored candidate"
        );

        Some(AssignmentOutcome {
            technician_id: technician.id,
            technician_name: technician.name.clone(),
            score,
            specialty_score,
            experience_score,
            workload_score,
            location_score,
            reasons,
        })
    }
}
