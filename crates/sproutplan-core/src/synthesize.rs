//! Plan synthesis: parse the collaborator's JSON-shaped response into a
//! [`StructuredPlan`], or build one deterministically from the candidate
//! pool when the response violates the contract.
//!
//! Parsing is defensive by design: fences are stripped, unmatched activities
//! are dropped silently, duplicates are dropped first-occurrence-wins. The
//! validation gate downstream decides whether what survives is acceptable.

use crate::model::{
    ActivityRecord, PlanPhase, PlanRequest, ScheduledActivity, ScoredActivity, StructuredPlan,
    PHASE_NAMES,
};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a response could not be assembled into a plan at all. Band and
/// uniqueness violations are caught later by the validator; these are the
/// earlier, purely structural rejections.
#[derive(Debug, Error)]
pub enum SynthesisRejection {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("response does not use the phase-based schema")]
    WrongSchema,

    #[error("missing required phase: {0}")]
    MissingPhase(String),
}

/// Maximum steps copied into a scheduled activity.
const MAX_STEPS: usize = 10;

#[derive(Debug, Deserialize)]
struct DraftPlan {
    #[serde(default)]
    plan_type: Option<String>,
    #[serde(default)]
    plan_name: Option<String>,
    #[serde(default)]
    plan_overview: Option<String>,
    #[serde(default)]
    total_duration_minutes: Option<u32>,
    #[serde(default)]
    planning_rationale: Option<String>,
    #[serde(default)]
    schedule: Option<Vec<DraftPhase>>,
}

#[derive(Debug, Deserialize)]
struct DraftPhase {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    order: Option<u32>,
    #[serde(default)]
    activities: Vec<DraftActivity>,
}

#[derive(Debug, Deserialize)]
struct DraftActivity {
    #[serde(default)]
    activity_id: String,
    #[serde(default)]
    activity_name: String,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    recommended_duration_minutes: Option<u32>,
    #[serde(default)]
    difficulty_adaptation: Option<String>,
    #[serde(default)]
    why_this_activity_here: Option<String>,
    #[serde(default)]
    step_by_step: Vec<String>,
    #[serde(default)]
    sensory_considerations: Option<String>,
    #[serde(default)]
    expected_outcome: Option<String>,
}

/// Strip a Markdown code fence (with optional `json` tag) and surrounding
/// prose-free whitespace from a raw response.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parse the collaborator's response against the candidate pool. Unmatched
/// and duplicate activities are dropped, dataset steps are preferred over
/// generated steps, and phases are re-ordered by their `order` field. The
/// result still has to pass the validation gate.
pub fn parse_plan_response(
    raw: &str,
    candidates: &[ScoredActivity],
    request: &PlanRequest,
) -> Result<StructuredPlan, SynthesisRejection> {
    let text = strip_code_fences(raw);
    let draft: DraftPlan =
        serde_json::from_str(text).map_err(|e| SynthesisRejection::InvalidJson(e.to_string()))?;
    let schedule = draft.schedule.ok_or(SynthesisRejection::WrongSchema)?;

    // Lookup by exact id and by lowercased exact name.
    let mut lookup: HashMap<String, &ActivityRecord> = HashMap::new();
    for candidate in candidates {
        lookup.insert(candidate.record.id.clone(), &candidate.record);
        lookup.insert(
            candidate.record.activity_name.to_lowercase(),
            &candidate.record,
        );
    }

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut phases: Vec<PlanPhase> = Vec::new();

    for (index, draft_phase) in schedule.into_iter().enumerate() {
        let mut activities = Vec::new();
        for act in draft_phase.activities {
            let name_lower = act.activity_name.trim().to_lowercase();
            if seen_ids.contains(&act.activity_id) || seen_names.contains(&name_lower) {
                warn!(
                    "Dropping duplicate activity from response: {} (ID: {})",
                    act.activity_name, act.activity_id
                );
                continue;
            }
            let Some(record) = lookup
                .get(&act.activity_id)
                .or_else(|| lookup.get(&name_lower))
            else {
                warn!(
                    "Dropping activity not in candidate pool: {} (ID: {})",
                    act.activity_name, act.activity_id
                );
                continue;
            };
            let record = *record;
            seen_ids.insert(record.id.clone());
            seen_names.insert(record.activity_name.to_lowercase());

            // Dataset steps are the source of truth; generated steps are a
            // fallback only.
            let steps = if !record.step_instructions.is_empty() {
                record
                    .step_instructions
                    .iter()
                    .take(MAX_STEPS)
                    .cloned()
                    .collect()
            } else if !act.step_by_step.is_empty() {
                act.step_by_step.into_iter().take(MAX_STEPS).collect()
            } else {
                vec!["Follow the activity instructions".to_string()]
            };

            activities.push(ScheduledActivity {
                activity_id: record.id.clone(),
                activity_name: record.activity_name.clone(),
                domain: act
                    .domain
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| record.domain.clone()),
                description: act.description.filter(|d| !d.is_empty()).unwrap_or_else(|| {
                    templated_description(record)
                }),
                recommended_duration_minutes: act
                    .recommended_duration_minutes
                    .unwrap_or(record.time_required_minutes),
                difficulty_adaptation: act
                    .difficulty_adaptation
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "Adapt based on child needs".to_string()),
                why_this_activity_here: act
                    .why_this_activity_here
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "Activity fits this phase".to_string()),
                step_by_step: steps,
                sensory_considerations: act
                    .sensory_considerations
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "Consider child sensory sensitivities".to_string()),
                expected_outcome: act
                    .expected_outcome
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "Positive engagement and skill development".to_string()),
            });
        }

        if !activities.is_empty() {
            phases.push(PlanPhase {
                phase: draft_phase.phase,
                order: draft_phase.order.unwrap_or(index as u32 + 1),
                activities,
            });
        }
    }

    for required in PHASE_NAMES {
        if !phases.iter().any(|p| p.phase == required) {
            return Err(SynthesisRejection::MissingPhase(required.to_string()));
        }
    }
    phases.sort_by_key(|p| p.order);

    let materials = aggregate_materials(&phases, candidates);
    let plan_type = request.plan_type.label().to_string();
    let total_duration = draft.total_duration_minutes.unwrap_or_else(|| {
        phases
            .iter()
            .flat_map(|p| &p.activities)
            .map(|a| a.recommended_duration_minutes)
            .sum()
    });

    let plan = StructuredPlan {
        plan_type: draft.plan_type.filter(|t| !t.is_empty()).unwrap_or(plan_type),
        plan_name: draft
            .plan_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{} Activity Plan", request.plan_type.label())),
        plan_overview: draft
            .plan_overview
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| "Structured activity plan".to_string()),
        total_duration_minutes: total_duration.max(30),
        planning_rationale: draft
            .planning_rationale
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "Plan structured to support child development".to_string()),
        materials_summary: materials,
        schedule: phases,
    };
    debug!(
        "Assembled plan from response: {} activities across {} phases",
        plan.total_activities(),
        plan.schedule.len()
    );
    Ok(plan)
}

/// Deterministic fallback: candidate-pool-only, no external call, same output
/// for the same curated list. Never fails; with zero candidates it emits an
/// explicit placeholder instead of raising.
pub fn build_fallback_plan(candidates: &[ScoredActivity], request: &PlanRequest) -> StructuredPlan {
    let target = request.plan_type.target_count();

    let mut selected: Vec<&ActivityRecord> = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    for candidate in candidates {
        if selected.len() >= target {
            break;
        }
        let name = candidate.record.activity_name.trim().to_lowercase();
        if seen_ids.contains(&candidate.record.id) || seen_names.contains(&name) {
            continue;
        }
        seen_ids.insert(candidate.record.id.clone());
        seen_names.insert(name);
        selected.push(&candidate.record);
    }

    let scheduled: Vec<ScheduledActivity> = if selected.is_empty() {
        warn!("No candidates available for fallback plan; emitting placeholder");
        vec![placeholder_activity(); 3]
    } else {
        selected.iter().map(|rec| scheduled_from_record(rec)).collect()
    };

    // 1-2 warm-up, most core, 1-2 calming; every phase non-empty, duplicating
    // in the degenerate one- and two-activity cases.
    let n = scheduled.len();
    let (warmup, core, calming): (Vec<_>, Vec<_>, Vec<_>) = match n {
        1 => (
            scheduled.clone(),
            scheduled.clone(),
            scheduled.clone(),
        ),
        2 => (
            scheduled[..1].to_vec(),
            scheduled[1..2].to_vec(),
            scheduled[1..2].to_vec(),
        ),
        _ => {
            let mut warmup_count = (n / 4).clamp(1, 2);
            let mut calming_count = (n / 4).clamp(1, 2);
            let mut core_count = n - warmup_count - calming_count;
            if core_count < 1 {
                if warmup_count > 1 {
                    warmup_count -= 1;
                } else {
                    calming_count -= 1;
                }
                core_count += 1;
            }
            (
                scheduled[..warmup_count].to_vec(),
                scheduled[warmup_count..warmup_count + core_count].to_vec(),
                scheduled[warmup_count + core_count..].to_vec(),
            )
        }
    };

    let phases = vec![
        PlanPhase {
            phase: "Warm-up".to_string(),
            order: 1,
            activities: warmup,
        },
        PlanPhase {
            phase: "Core".to_string(),
            order: 2,
            activities: core,
        },
        PlanPhase {
            phase: "Calming".to_string(),
            order: 3,
            activities: calming,
        },
    ];

    let total_duration: u32 = scheduled
        .iter()
        .map(|a| a.recommended_duration_minutes)
        .sum();
    let materials: BTreeSet<String> = selected
        .iter()
        .flat_map(|rec| rec.materials.iter().cloned())
        .collect();

    let label = request.plan_type.label();
    StructuredPlan {
        plan_type: label.to_string(),
        plan_name: format!("Basic {label} Activity Plan"),
        plan_overview: format!(
            "A {} plan tailored to the child's needs and available resources.",
            label.to_lowercase()
        ),
        total_duration_minutes: total_duration.max(30),
        planning_rationale: "Plan structured to provide a balanced progression from warm-up \
            activities through core learning to calming transitions."
            .to_string(),
        materials_summary: materials.into_iter().collect(),
        schedule: phases,
    }
}

fn templated_description(record: &ActivityRecord) -> String {
    format!(
        "This activity involves {} and helps support {}.",
        record.activity_name.to_lowercase(),
        if record.goal.is_empty() {
            "development goals"
        } else {
            &record.goal
        }
    )
}

fn scheduled_from_record(record: &ActivityRecord) -> ScheduledActivity {
    let steps = if record.step_instructions.is_empty() {
        vec!["Follow the activity instructions".to_string()]
    } else {
        record
            .step_instructions
            .iter()
            .take(MAX_STEPS)
            .cloned()
            .collect()
    };
    let goal = if record.goal.is_empty() {
        "development goals".to_string()
    } else {
        record.goal.clone()
    };
    ScheduledActivity {
        activity_id: record.id.clone(),
        activity_name: record.activity_name.clone(),
        domain: record.domain.clone(),
        description: templated_description(record),
        recommended_duration_minutes: record.time_required_minutes,
        difficulty_adaptation: "Adjust based on child's autism level and age.".to_string(),
        why_this_activity_here: "Activity selected to support child development goals.".to_string(),
        step_by_step: steps,
        sensory_considerations: "Consider child's sensory sensitivities when implementing."
            .to_string(),
        expected_outcome: format!("Supports {goal}."),
    }
}

fn placeholder_activity() -> ScheduledActivity {
    ScheduledActivity {
        activity_id: "0".to_string(),
        activity_name: "No activities available".to_string(),
        domain: "Mixed".to_string(),
        description: "Placeholder activity - no activities are currently available in the dataset."
            .to_string(),
        recommended_duration_minutes: 10,
        difficulty_adaptation: "Please add more activities to the dataset.".to_string(),
        why_this_activity_here: "Placeholder due to insufficient activities.".to_string(),
        step_by_step: vec!["Contact administrator to add more activities.".to_string()],
        sensory_considerations: "N/A".to_string(),
        expected_outcome: "System will work once more activities are available.".to_string(),
    }
}

fn aggregate_materials(phases: &[PlanPhase], candidates: &[ScoredActivity]) -> Vec<String> {
    let by_id: HashMap<&str, &ActivityRecord> = candidates
        .iter()
        .map(|c| (c.record.id.as_str(), &c.record))
        .collect();
    let materials: BTreeSet<String> = phases
        .iter()
        .flat_map(|p| &p.activities)
        .filter_map(|a| by_id.get(a.activity_id.as_str()))
        .flat_map(|rec| rec.materials.iter().cloned())
        .collect();
    materials.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::sample_record;
    use crate::model::{
        AttentionLevel, BudgetTier, Environment, PlanType,
    };

    fn request() -> PlanRequest {
        PlanRequest {
            budget: BudgetTier::Low,
            available_materials: Vec::new(),
            attention_level: AttentionLevel::Medium,
            environment: Environment::Home,
            plan_type: PlanType::Daily,
            time_available_minutes: Some(60),
        }
    }

    fn candidates(n: usize) -> Vec<ScoredActivity> {
        (1..=n)
            .map(|i| ScoredActivity {
                record: sample_record(&format!("a{i}")),
                similarity: 1.0 - i as f32 * 0.01,
                semantic_rank: i - 1,
                reinforcement_score: 0.5,
                boost: 1.0,
            })
            .collect()
    }

    fn response_json(ids: &[&str]) -> String {
        let mk = |id: &str| {
            format!(
                r#"{{"activity_id": "{id}", "activity_name": "Activity {id}", "recommended_duration_minutes": 10, "step_by_step": ["llm step"]}}"#
            )
        };
        let warm = mk(ids[0]);
        let core: Vec<String> = ids[1..ids.len() - 1].iter().map(|i| mk(i)).collect();
        let calm = mk(ids[ids.len() - 1]);
        format!(
            r#"{{
              "plan_type": "Daily",
              "plan_name": "Motor Focus Day",
              "plan_overview": "A motor-focused session.",
              "total_duration_minutes": 60,
              "planning_rationale": "Build up then wind down.",
              "schedule": [
                {{"phase": "Warm-up", "order": 1, "activities": [{warm}]}},
                {{"phase": "Core", "order": 2, "activities": [{}]}},
                {{"phase": "Calming", "order": 3, "activities": [{calm}]}}
              ]
            }}"#,
            core.join(",")
        )
    }

    #[test]
    fn well_formed_response_parses() {
        let pool = candidates(8);
        let raw = response_json(&["a1", "a2", "a3", "a4", "a5", "a6"]);
        let plan = parse_plan_response(&raw, &pool, &request()).unwrap();
        assert_eq!(plan.total_activities(), 6);
        assert_eq!(plan.plan_name, "Motor Focus Day");
        assert_eq!(plan.schedule[0].phase, "Warm-up");
        // Dataset steps win over generated steps.
        assert_eq!(
            plan.schedule[0].activities[0].step_by_step,
            vec!["Roll the ball".to_string()]
        );
        assert!(plan.materials_summary.contains(&"ball".to_string()));
    }

    #[test]
    fn fenced_response_is_unwrapped() {
        let pool = candidates(8);
        let raw = format!(
            "```json\n{}\n```",
            response_json(&["a1", "a2", "a3", "a4", "a5", "a6"])
        );
        assert!(parse_plan_response(&raw, &pool, &request()).is_ok());
    }

    #[test]
    fn invented_activities_are_dropped_silently() {
        let pool = candidates(8);
        let raw = response_json(&["a1", "ghost", "a3", "a4", "a5", "a6"]);
        let plan = parse_plan_response(&raw, &pool, &request()).unwrap();
        assert_eq!(plan.total_activities(), 5);
        assert!(plan
            .schedule
            .iter()
            .flat_map(|p| &p.activities)
            .all(|a| a.activity_id != "ghost"));
    }

    #[test]
    fn name_match_is_case_insensitive() {
        let pool = candidates(8);
        let raw = response_json(&["a1", "a2", "a3", "a4", "a5", "a6"])
            .replace(r#""activity_id": "a2""#, r#""activity_id": "nope""#)
            .replace("Activity a2", "ACTIVITY A2");
        let plan = parse_plan_response(&raw, &pool, &request()).unwrap();
        // Matched by name; id restored from the dataset record.
        assert!(plan
            .schedule
            .iter()
            .flat_map(|p| &p.activities)
            .any(|a| a.activity_id == "a2"));
    }

    #[test]
    fn duplicates_keep_first_occurrence() {
        let pool = candidates(8);
        let raw = response_json(&["a1", "a2", "a2", "a4", "a5", "a6"]);
        let plan = parse_plan_response(&raw, &pool, &request()).unwrap();
        assert_eq!(plan.total_activities(), 5);
    }

    #[test]
    fn non_json_is_rejected() {
        let pool = candidates(8);
        assert!(matches!(
            parse_plan_response("Sure! Here is a plan for you.", &pool, &request()),
            Err(SynthesisRejection::InvalidJson(_))
        ));
    }

    #[test]
    fn missing_schedule_is_wrong_schema() {
        let pool = candidates(8);
        assert!(matches!(
            parse_plan_response(r#"{"activities": []}"#, &pool, &request()),
            Err(SynthesisRejection::WrongSchema)
        ));
    }

    #[test]
    fn missing_phase_is_rejected() {
        let pool = candidates(8);
        let raw = response_json(&["a1", "a2", "a3", "a4", "a5", "a6"])
            .replace(r#""phase": "Calming""#, r#""phase": "Wind-down""#);
        assert!(matches!(
            parse_plan_response(&raw, &pool, &request()),
            Err(SynthesisRejection::MissingPhase(_))
        ));
    }

    #[test]
    fn fallback_is_deterministic_and_balanced() {
        let pool = candidates(12);
        let first = build_fallback_plan(&pool, &request());
        let second = build_fallback_plan(&pool, &request());
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.total_activities(), 6);
        assert_eq!(first.schedule.len(), 3);
        assert!(first.schedule.iter().all(|p| !p.activities.is_empty()));
        // 6 activities: 1 warm-up, 4 core, 1 calming.
        assert_eq!(first.schedule[0].activities.len(), 1);
        assert_eq!(first.schedule[1].activities.len(), 4);
        assert_eq!(first.schedule[2].activities.len(), 1);
    }

    #[test]
    fn fallback_duplicates_single_candidate_across_phases() {
        let pool = candidates(1);
        let plan = build_fallback_plan(&pool, &request());
        assert!(plan.schedule.iter().all(|p| p.activities.len() == 1));
        assert!(plan
            .schedule
            .iter()
            .all(|p| p.activities[0].activity_id == "a1"));
    }

    #[test]
    fn fallback_with_no_candidates_emits_placeholder() {
        let plan = build_fallback_plan(&[], &request());
        assert_eq!(plan.schedule.len(), 3);
        assert!(plan
            .schedule
            .iter()
            .all(|p| p.activities[0].activity_name == "No activities available"));
    }

    #[test]
    fn fallback_floors_duration_at_thirty_minutes() {
        let mut pool = candidates(1);
        pool[0].record.time_required_minutes = 5;
        let plan = build_fallback_plan(&pool, &request());
        assert_eq!(plan.total_duration_minutes, 30);
    }
}
