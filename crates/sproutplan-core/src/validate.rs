//! Structural validation gate for assembled plans.
//!
//! Any violation routes the synthesis result to the fallback builder; the
//! typed reasons exist so rejections can be logged and collaborator quality
//! audited over time.

use crate::model::{PlanType, StructuredPlan, PHASE_NAMES};
use std::collections::HashSet;
use thiserror::Error;

/// Reason a synthesized plan was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanViolation {
    #[error("expected phases {expected:?}, found {found:?}")]
    PhaseStructure {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("plan has {actual} activities, expected {min}-{max}")]
    ActivityCount {
        actual: usize,
        min: usize,
        max: usize,
    },

    #[error("activity {name} (ID: {id}) not in candidate set")]
    Provenance { id: String, name: String },

    #[error("duplicate activity {what}: {value}")]
    Duplicate { what: &'static str, value: String },
}

/// Run every hard invariant against the plan. `candidate_ids` is the pool the
/// synthesizer was given; provenance is checked by id.
pub fn validate_plan(
    plan: &StructuredPlan,
    plan_type: PlanType,
    candidate_ids: &HashSet<String>,
) -> Result<(), PlanViolation> {
    validate_phase_structure(plan)?;
    validate_activity_count(plan, plan_type)?;
    validate_provenance(plan, candidate_ids)?;
    validate_no_duplicates(plan)?;
    Ok(())
}

/// Exactly three phases named Warm-up/Core/Calming, in that order.
pub fn validate_phase_structure(plan: &StructuredPlan) -> Result<(), PlanViolation> {
    let found: Vec<String> = plan.schedule.iter().map(|p| p.phase.clone()).collect();
    let expected: Vec<String> = PHASE_NAMES.iter().map(|s| s.to_string()).collect();
    if found != expected {
        return Err(PlanViolation::PhaseStructure { expected, found });
    }
    Ok(())
}

/// Total activities must fall within the plan type's band.
pub fn validate_activity_count(
    plan: &StructuredPlan,
    plan_type: PlanType,
) -> Result<(), PlanViolation> {
    let (min, max) = plan_type.activity_band();
    let actual = plan.total_activities();
    if actual < min || actual > max {
        return Err(PlanViolation::ActivityCount { actual, min, max });
    }
    Ok(())
}

/// Every scheduled activity id must come from the candidate pool.
pub fn validate_provenance(
    plan: &StructuredPlan,
    candidate_ids: &HashSet<String>,
) -> Result<(), PlanViolation> {
    for phase in &plan.schedule {
        for activity in &phase.activities {
            if !candidate_ids.contains(&activity.activity_id) {
                return Err(PlanViolation::Provenance {
                    id: activity.activity_id.clone(),
                    name: activity.activity_name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// No activity id or name (case-insensitive) may repeat anywhere in the plan.
pub fn validate_no_duplicates(plan: &StructuredPlan) -> Result<(), PlanViolation> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    for phase in &plan.schedule {
        for activity in &phase.activities {
            if !seen_ids.insert(activity.activity_id.clone()) {
                return Err(PlanViolation::Duplicate {
                    what: "id",
                    value: activity.activity_id.clone(),
                });
            }
            let name = activity.activity_name.trim().to_lowercase();
            if !seen_names.insert(name) {
                return Err(PlanViolation::Duplicate {
                    what: "name",
                    value: activity.activity_name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// True when the plan carries at least one calming activity.
pub fn has_calming_activity(plan: &StructuredPlan) -> bool {
    plan.schedule
        .iter()
        .any(|p| p.phase == "Calming" && !p.activities.is_empty())
}
