//! Candidate curation: reinforcement re-ranking, safety and materials
//! filtering, and diversity shaping of the raw semantic search results.
//!
//! Every filter here short-circuits per activity; ordering of the checks is
//! part of the contract (age, then autism level, then sensory).

use crate::config::CurationConfig;
use crate::index::SearchHit;
use crate::model::{ChildProfile, PlanRequest, ScoredActivity, Sensitivity};
use crate::scorer::ActivityScorer;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Drop avoided activities, attach reinforcement signals, and re-rank by
/// boost (semantic rank breaks ties via stable sort).
pub fn apply_reinforcement(hits: Vec<SearchHit>, scorer: &ActivityScorer) -> Vec<ScoredActivity> {
    let total = hits.len();
    let mut scored = Vec::with_capacity(total);
    let mut avoided = 0usize;
    for (semantic_rank, hit) in hits.into_iter().enumerate() {
        if scorer.should_avoid(&hit.record.id) {
            avoided += 1;
            warn!(
                "Dropping {} ({}) from pool: poor recent outcomes",
                hit.record.id, hit.record.activity_name
            );
            continue;
        }
        let reinforcement_score = scorer.score(&hit.record.id);
        let boost = scorer.boost(&hit.record.id);
        scored.push(ScoredActivity {
            record: hit.record,
            similarity: hit.similarity,
            semantic_rank,
            reinforcement_score,
            boost,
        });
    }
    // Stable sort: equal boosts keep semantic order.
    scored.sort_by(|a, b| b.boost.partial_cmp(&a.boost).unwrap_or(std::cmp::Ordering::Equal));
    info!(
        "Reinforcement pass: {total} candidates, {avoided} avoided, {} kept",
        scored.len()
    );
    scored
}

/// Safety filters: age range (lenient on unparsable), autism level substring,
/// and sensory-seeking exclusion for med-or-high sensitivity.
pub fn apply_safety_filters(
    profile: &ChildProfile,
    activities: Vec<ScoredActivity>,
) -> Vec<ScoredActivity> {
    let level = profile.autism_level.to_string();
    let sensitive = profile.sensory_sensitivity.any_at_least(Sensitivity::Med);
    activities
        .into_iter()
        .filter(|a| {
            if !a.record.suits_age(profile.age) {
                return false;
            }
            if !a.record.autism_level_suitability.contains(&level) {
                return false;
            }
            if sensitive
                && a.record
                    .sensory_suitability
                    .to_lowercase()
                    .contains("sensory-seeking")
            {
                return false;
            }
            true
        })
        .collect()
}

/// Strict materials mode: only active when the request lists materials.
/// An activity survives on a case-insensitive exact or bidirectional
/// substring match; activities with no listed materials are excluded.
pub fn strict_filter_by_materials(
    activities: Vec<ScoredActivity>,
    available_materials: &[String],
) -> Vec<ScoredActivity> {
    if available_materials.is_empty() {
        return activities;
    }
    let available: Vec<String> = available_materials
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect();

    activities
        .into_iter()
        .filter(|a| {
            let listed: Vec<String> = a
                .record
                .materials
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect();
            if listed.is_empty() {
                // No escape hatch once materials are specified.
                return false;
            }
            listed.iter().any(|mat| {
                available
                    .iter()
                    .any(|avail| mat == avail || mat.contains(avail.as_str()) || avail.contains(mat.as_str()))
            })
        })
        .collect()
}

/// Diversity shaping: goal-matching candidates first, de-duplication by id
/// and lowercased name, per-(domain, goal) quota, and a near-duplicate name
/// guard. A candidate opening a new (domain, goal) key is always admitted;
/// the accumulation ceiling bounds only repeat-key admissions, so the output
/// can exceed it when the corpus is varied and the pool cap downstream can
/// bind.
pub fn ensure_variety(
    config: &CurationConfig,
    profile: &ChildProfile,
    activities: Vec<ScoredActivity>,
) -> Vec<ScoredActivity> {
    if activities.is_empty() {
        return activities;
    }

    let goals: Vec<&str> = profile.goals.iter().map(|g| g.as_str()).collect();
    let matches_goal = |a: &ScoredActivity| -> bool {
        if goals.is_empty() {
            return false;
        }
        let name = a.record.activity_name.to_lowercase();
        let goal_text = a.record.goal.to_lowercase();
        goals.iter().any(|g| {
            goal_text.contains(g)
                || name.contains(g)
                || a.record
                    .skills_targeted
                    .iter()
                    .any(|s| s.to_lowercase().contains(g))
        })
    };

    let (goal_matching, others): (Vec<_>, Vec<_>) =
        activities.into_iter().partition(|a| matches_goal(a));
    debug!(
        "Diversity pass: {} goal-matching, {} others",
        goal_matching.len(),
        others.len()
    );

    let mut diverse: Vec<ScoredActivity> = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for activity in goal_matching.into_iter().chain(others) {
        let name = activity.record.activity_name.to_lowercase();
        if seen_names.contains(&name) || seen_ids.contains(&activity.record.id) {
            continue;
        }
        let key = format!(
            "{}_{}",
            activity.record.domain.to_lowercase(),
            activity.record.goal.to_lowercase()
        );
        let admit = if !seen_keys.contains(&key) || diverse.len() < config.unconditional_per_key {
            true
        } else if diverse.len() >= config.diversity_ceiling {
            false
        } else {
            // Near-duplicate guard against the first selections.
            !diverse
                .iter()
                .take(config.unconditional_per_key)
                .any(|existing| {
                    let existing_name = existing.record.activity_name.to_lowercase();
                    name.contains(existing_name.as_str()) || existing_name.contains(name.as_str())
                })
        };
        if admit {
            seen_names.insert(name);
            seen_ids.insert(activity.record.id.clone());
            seen_keys.insert(key);
            diverse.push(activity);
        }
    }
    diverse
}

/// Full curation pass, ending with the pool cap handed to the synthesizer.
pub fn curate(
    config: &CurationConfig,
    profile: &ChildProfile,
    request: &PlanRequest,
    hits: Vec<SearchHit>,
    scorer: &ActivityScorer,
) -> Vec<ScoredActivity> {
    let scored = apply_reinforcement(hits, scorer);
    let safe = apply_safety_filters(profile, scored);
    let mut diverse = ensure_variety(config, profile, safe);

    if !request.available_materials.is_empty() {
        let before = diverse.len();
        diverse = strict_filter_by_materials(diverse, &request.available_materials);
        let (min_required, _) = request.plan_type.activity_band();
        if diverse.len() < min_required {
            warn!(
                "Only {} of {before} activities match available materials (need {min_required}); plan generation may be limited",
                diverse.len()
            );
        }
    }

    let (min_required, _) = request.plan_type.activity_band();
    let cap = config.pool_floor.max(min_required * config.pool_multiplier);
    diverse.truncate(cap);
    diverse
}
