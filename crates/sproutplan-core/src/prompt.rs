//! Prompt construction for the external plan generator.
//!
//! The prompt text is a versioned contract artifact: the selection rules the
//! collaborator must follow (dataset-only, unique activities, JSON-only
//! output, strict materials mode) live here in natural language, and only
//! the post-hoc validator can enforce them. Golden fixtures in the tests
//! pin the structure so contract drift is visible in review.

use crate::model::{ChildProfile, OutcomeRecord, PlanRequest, ScoredActivity};
use std::fmt::Write as _;

/// System and user texts for one generation call.
#[derive(Debug, Clone)]
pub struct PlanPrompt {
    pub system: String,
    pub user: String,
}

/// Fixed system instruction: role, hard rules, safety constraints.
pub const SYSTEM_PROMPT: &str = "\
You are an expert therapist creating structured, child-specific ACTIVITY PLANS for children with autism spectrum disorder (ASD).

CRITICAL RULES:
1. You MUST ONLY use activities from the provided dataset. DO NOT invent, modify, or create new activities.
2. You are creating a COHERENT PLAN, not just listing activities. Think like a therapist planning a session.
3. Activities are BUILDING BLOCKS - arrange them into a logical flow: Warm-up, then Core, then Calming.
4. DO NOT repeat the same activity. Each activity must be unique.
5. Adapt activity duration and difficulty based on the child's profile.
6. Explain WHY each activity is placed in its phase.
7. Return ONLY valid JSON matching the exact schema provided - no markdown, no extra text.
8. Use intelligent filtering: analyze each activity's goals, skills, difficulty, age range, materials, and sensory suitability against the child's profile, and balance variety across domains.

CRITICAL SAFETY CONSTRAINTS:
- NEVER provide medical advice or diagnosis
- NEVER suggest activities that could be harmful
- Respect sensory sensitivities (avoid high sensory load if the child has high sensitivity)
- Use simple, clear language appropriate to the child's communication level
- Focus on activities that are safe, engaging, and developmentally appropriate

MATERIALS FILTERING (STRICT MODE WHEN MATERIALS PROVIDED):
- When available materials are specified, you MUST ONLY select activities whose Materials field matches at least one available material (case-insensitive, partial matches allowed)
- Activities with empty materials are EXCLUDED when materials are provided
- When NO materials are specified, filter by child goals, age, autism level, communication level, sensory needs, attention level, environment, and recent outcomes";

/// Build the full prompt pair for one recommendation call.
pub fn build_plan_prompt(
    profile: &ChildProfile,
    candidates: &[ScoredActivity],
    request: &PlanRequest,
    recent_outcomes: &[OutcomeRecord],
) -> PlanPrompt {
    let (min_activities, max_activities) = request.plan_type.activity_band();
    let plan_type = request.plan_type.label();
    let goals_text = if profile.goals.is_empty() {
        "General development".to_string()
    } else {
        profile
            .goals
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let time_text = request
        .time_available_minutes
        .map(|m| m.to_string())
        .unwrap_or_else(|| "Not specified".to_string());
    let materials_text = if request.available_materials.is_empty() {
        "Any materials".to_string()
    } else {
        request.available_materials.join(", ")
    };

    let mut user = String::new();
    let _ = writeln!(
        user,
        "You are creating a {plan_type} ACTIVITY PLAN for a child with autism. Think like a therapist planning a structured session.\n"
    );
    let _ = writeln!(user, "CHILD PROFILE:");
    let _ = writeln!(user, "- Name: {}", profile.name);
    let _ = writeln!(user, "- Age: {} years", profile.age);
    let _ = writeln!(user, "- Communication Level: {}", profile.communication_level);
    let _ = writeln!(
        user,
        "- Autism Level: {} (support needs)",
        profile.autism_level
    );
    let s = &profile.sensory_sensitivity;
    let _ = writeln!(
        user,
        "- Sensory Sensitivities: Sound={}, Light={}, Touch={}",
        s.sound, s.light, s.touch
    );
    let _ = writeln!(user, "- Goals: {goals_text}\n");

    let _ = writeln!(user, "PLAN REQUIREMENTS:");
    let _ = writeln!(
        user,
        "- Plan Type: {plan_type} ({min_activities}-{max_activities} total activities)"
    );
    let _ = writeln!(user, "- Time Available: {time_text} minutes");
    let _ = writeln!(user, "- Budget: {}", request.budget);
    let _ = writeln!(user, "- Available Materials: {materials_text}");
    let _ = writeln!(user, "- Attention Level: {}", request.attention_level);
    let _ = writeln!(user, "- Environment: {}", request.environment);

    if !request.available_materials.is_empty() {
        let _ = writeln!(
            user,
            "\n*** CRITICAL MATERIALS CONSTRAINT - STRICT FILTERING REQUIRED ***"
        );
        let _ = writeln!(
            user,
            "The candidate list has been pre-filtered to activities using the available materials. You MUST select ONLY from these candidates; every activity you pick must use at least one of: {materials_text}. Do not select activities with empty materials."
        );
    }

    let _ = writeln!(user, "\nRECENT OUTCOMES (for learning):");
    let _ = writeln!(user, "{}", format_outcomes(recent_outcomes));

    let _ = writeln!(
        user,
        "\nAVAILABLE ACTIVITIES FROM DATASET (YOU MUST ONLY USE THESE):"
    );
    let _ = writeln!(user, "{}", format_activities(candidates));

    let core_min = min_activities.saturating_sub(3).max(2);
    let core_max = max_activities.saturating_sub(2);
    let _ = writeln!(
        user,
        "\nYOUR TASK: Create a structured plan with EXACTLY {min_activities}-{max_activities} TOTAL activities organized into three phases:\n\
        1. WARM-UP PHASE (order: 1): 1-2 gentle, low-demand activities that prepare the child for engagement.\n\
        2. CORE PHASE (order: 2): {core_min}-{core_max} main learning activities, balanced across domains, no duplicates.\n\
        3. CALMING PHASE (order: 3): 1-2 calming, low-stimulation activities for the transition to rest.\n\
        The TOTAL across ALL phases must be {min_activities}-{max_activities}; do NOT return one activity per phase."
    );

    let _ = writeln!(
        user,
        "\nCRITICAL REQUIREMENTS:\n\
        1. Use EXACT activity_id and activity_name values from the dataset above; never invent ids or names.\n\
        2. No activity_id or activity_name may appear more than once in the plan.\n\
        3. Prioritize activities matching the child's goals: {goals_text}. At least half should directly support them.\n\
        4. Use the dataset Steps as the base for step_by_step; adapt only for this child's age, autism level, or sensory needs.\n\
        5. Adapt durations to the attention level and keep the total near {time_text} minutes when specified.\n\
        6. Collect ALL materials needed across activities into materials_summary."
    );

    let _ = writeln!(
        user,
        "\nOUTPUT FORMAT (STRICT JSON ONLY - NO MARKDOWN):\n\
{{\n\
  \"plan_type\": \"{plan_type}\",\n\
  \"plan_name\": \"Descriptive name for this plan\",\n\
  \"plan_overview\": \"2-3 sentence overview for this specific child\",\n\
  \"total_duration_minutes\": 60,\n\
  \"planning_rationale\": \"Why the plan is structured this way\",\n\
  \"materials_summary\": [\"material1\", \"material2\"],\n\
  \"schedule\": [\n\
    {{\n\
      \"phase\": \"Warm-up\",\n\
      \"order\": 1,\n\
      \"activities\": [\n\
        {{\n\
          \"activity_id\": \"<exact ID from dataset>\",\n\
          \"activity_name\": \"<exact name from dataset>\",\n\
          \"domain\": \"<domain from dataset>\",\n\
          \"description\": \"Brief description of what the child will do\",\n\
          \"recommended_duration_minutes\": 10,\n\
          \"difficulty_adaptation\": \"How to adapt difficulty for this child\",\n\
          \"why_this_activity_here\": \"Why this activity is in this phase and how it supports the goals\",\n\
          \"step_by_step\": [\"step 1\", \"step 2\"],\n\
          \"sensory_considerations\": \"Sensory adaptations for this child\",\n\
          \"expected_outcome\": \"Expected outcome for this child\"\n\
        }}\n\
      ]\n\
    }},\n\
    {{ \"phase\": \"Core\", \"order\": 2, \"activities\": [] }},\n\
    {{ \"phase\": \"Calming\", \"order\": 3, \"activities\": [] }}\n\
  ]\n\
}}\n\
Return ONLY the JSON object. Ensure total activities = {min_activities}-{max_activities} and total_duration_minutes >= 30."
    );

    PlanPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Candidate list as the collaborator sees it: `idx. ID | Name` plus the
/// attributes selection depends on and the first few steps.
pub fn format_activities(candidates: &[ScoredActivity]) -> String {
    let mut out = Vec::with_capacity(candidates.len());
    for (idx, candidate) in candidates.iter().enumerate() {
        let rec = &candidate.record;
        let materials = if rec.materials.is_empty() {
            "None specified".to_string()
        } else {
            rec.materials.join(", ")
        };
        let steps = if rec.step_instructions.is_empty() {
            String::new()
        } else {
            format!(
                "\n   Steps: {}",
                rec.step_instructions
                    .iter()
                    .take(5)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" | ")
            )
        };
        out.push(format!(
            "{}. ID: {} | Name: {}\n   Domain: {}\n   Goal: {}\n   Skills: {}\n   Difficulty: {}\n   Age Range: {}\n   Sensory Suitability: {}\n   Autism Level: {}\n   Duration: {} minutes\n   Materials: {materials}{steps}",
            idx + 1,
            rec.id,
            rec.activity_name,
            rec.domain,
            rec.goal,
            rec.skills_targeted.join(", "),
            rec.difficulty,
            rec.age_range,
            rec.sensory_suitability,
            rec.autism_level_suitability,
            rec.time_required_minutes,
        ));
    }
    out.join("\n")
}

/// Recent outcome block: ratings plus caregiver notes.
pub fn format_outcomes(outcomes: &[OutcomeRecord]) -> String {
    if outcomes.is_empty() {
        return "No recent outcomes available.".to_string();
    }
    outcomes
        .iter()
        .map(|o| {
            let notes = if o.notes.is_empty() { "None" } else { &o.notes };
            format!(
                "- Activity: {}\n  Engagement: {}/5, Stress: {}/5, Success: {}/5\n  Notes: {notes}",
                if o.activity_name.is_empty() {
                    &o.activity_id
                } else {
                    &o.activity_name
                },
                o.engagement,
                o.stress,
                o.success,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::sample_record;
    use crate::model::{
        AttentionLevel, AutismLevel, BudgetTier, ChildProfile, CommunicationLevel, Environment,
        Goal, PlanType, SensoryProfile,
    };
    use chrono::Utc;

    fn profile() -> ChildProfile {
        ChildProfile {
            id: "p1".to_string(),
            name: "Sam".to_string(),
            age: 6,
            communication_level: CommunicationLevel::Limited,
            autism_level: AutismLevel::Level2,
            sensory_sensitivity: SensoryProfile::default(),
            goals: vec![Goal::Motor],
        }
    }

    fn request(materials: Vec<String>) -> PlanRequest {
        PlanRequest {
            budget: BudgetTier::Low,
            available_materials: materials,
            attention_level: AttentionLevel::Medium,
            environment: Environment::Home,
            plan_type: PlanType::Daily,
            time_available_minutes: Some(60),
        }
    }

    fn candidate(id: &str) -> ScoredActivity {
        ScoredActivity {
            record: sample_record(id),
            similarity: 0.8,
            semantic_rank: 0,
            reinforcement_score: 0.5,
            boost: 1.0,
        }
    }

    #[test]
    fn system_prompt_pins_hard_rules() {
        assert!(SYSTEM_PROMPT.contains("MUST ONLY use activities from the provided dataset"));
        assert!(SYSTEM_PROMPT.contains("Return ONLY valid JSON"));
        assert!(SYSTEM_PROMPT.contains("NEVER provide medical advice"));
        assert!(SYSTEM_PROMPT.contains("STRICT MODE WHEN MATERIALS PROVIDED"));
    }

    #[test]
    fn daily_prompt_matches_golden_fixture() {
        let prompt = build_plan_prompt(&profile(), &[candidate("a1")], &request(Vec::new()), &[]);
        assert_eq!(
            prompt.user,
            include_str!("../tests/fixtures/daily_plan_prompt.txt")
        );
    }

    #[test]
    fn user_prompt_embeds_profile_band_and_candidates() {
        let prompt = build_plan_prompt(&profile(), &[candidate("a1")], &request(Vec::new()), &[]);
        assert!(prompt.user.contains("- Name: Sam"));
        assert!(prompt.user.contains("- Age: 6 years"));
        assert!(prompt.user.contains("Autism Level: Level 2"));
        assert!(prompt.user.contains("Daily (5-7 total activities)"));
        assert!(prompt.user.contains("ID: a1 | Name: Activity a1"));
        assert!(prompt.user.contains("No recent outcomes available."));
        assert!(prompt.user.contains("\"phase\": \"Warm-up\""));
        // No materials constraint section without materials.
        assert!(!prompt.user.contains("CRITICAL MATERIALS CONSTRAINT"));
    }

    #[test]
    fn materials_section_appears_only_in_strict_mode() {
        let prompt = build_plan_prompt(
            &profile(),
            &[candidate("a1")],
            &request(vec!["paper".to_string()]),
            &[],
        );
        assert!(prompt.user.contains("CRITICAL MATERIALS CONSTRAINT"));
        assert!(prompt.user.contains("at least one of: paper"));
    }

    #[test]
    fn outcomes_block_carries_ratings_and_notes() {
        let outcomes = vec![OutcomeRecord {
            profile_id: "p1".to_string(),
            activity_id: "a1".to_string(),
            activity_name: "Ball Rolling".to_string(),
            engagement: 4,
            stress: 2,
            success: 5,
            notes: "Loved it".to_string(),
            completed_at: Utc::now(),
        }];
        let block = format_outcomes(&outcomes);
        assert!(block.contains("Activity: Ball Rolling"));
        assert!(block.contains("Engagement: 4/5, Stress: 2/5, Success: 5/5"));
        assert!(block.contains("Notes: Loved it"));
    }

    #[test]
    fn activity_block_lists_first_five_steps() {
        let mut c = candidate("a1");
        c.record.step_instructions = (1..=8).map(|i| format!("Step {i}")).collect();
        let block = format_activities(&[c]);
        assert!(block.contains("Step 5"));
        assert!(!block.contains("Step 6"));
        assert!(block.contains("Duration: 15 minutes"));
    }
}
