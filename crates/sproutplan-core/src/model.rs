//! Shared data types for the recommendation pipeline.
//!
//! Profiles and outcomes are owned by the external document store and arrive
//! read-only. Activity records are corpus entities, immutable once indexed.
//! Plans are the pipeline's output and carry the three-phase structure the
//! validator enforces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Communication level declared on a child profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationLevel {
    Nonverbal,
    Limited,
    Verbal,
}

impl fmt::Display for CommunicationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunicationLevel::Nonverbal => write!(f, "nonverbal"),
            CommunicationLevel::Limited => write!(f, "limited"),
            CommunicationLevel::Verbal => write!(f, "verbal"),
        }
    }
}

/// Autism support level. `Display` renders the exact "Level N" form that is
/// substring-matched against corpus `autism_level_suitability` tags
/// (e.g. "Level 2 (moderate support)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutismLevel {
    #[serde(rename = "Level 1")]
    Level1,
    #[serde(rename = "Level 2")]
    Level2,
    #[serde(rename = "Level 3")]
    Level3,
}

impl fmt::Display for AutismLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutismLevel::Level1 => write!(f, "Level 1"),
            AutismLevel::Level2 => write!(f, "Level 2"),
            AutismLevel::Level3 => write!(f, "Level 3"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    Med,
    High,
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sensitivity::Low => write!(f, "low"),
            Sensitivity::Med => write!(f, "med"),
            Sensitivity::High => write!(f, "high"),
        }
    }
}

/// Per-channel sensory sensitivity map (sound/light/touch).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SensoryProfile {
    pub sound: Sensitivity,
    pub light: Sensitivity,
    pub touch: Sensitivity,
}

impl Default for SensoryProfile {
    fn default() -> Self {
        Self {
            sound: Sensitivity::Low,
            light: Sensitivity::Low,
            touch: Sensitivity::Low,
        }
    }
}

impl SensoryProfile {
    /// True if any channel is at `floor` or above.
    pub fn any_at_least(&self, floor: Sensitivity) -> bool {
        self.sound >= floor || self.light >= floor || self.touch >= floor
    }
}

/// Closed goal vocabulary shared by profiles and the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Goal {
    Attention,
    Memory,
    Social,
    Motor,
    Emotion,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::Attention => "attention",
            Goal::Memory => "memory",
            Goal::Social => "social",
            Goal::Motor => "motor",
            Goal::Emotion => "emotion",
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Child profile, read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildProfile {
    pub id: String,
    pub name: String,
    pub age: u8,
    pub communication_level: CommunicationLevel,
    pub autism_level: AutismLevel,
    #[serde(default)]
    pub sensory_sensitivity: SensoryProfile,
    #[serde(default)]
    pub goals: Vec<Goal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetTier::Low => write!(f, "low"),
            BudgetTier::Medium => write!(f, "medium"),
            BudgetTier::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for AttentionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttentionLevel::Low => write!(f, "low"),
            AttentionLevel::Medium => write!(f, "medium"),
            AttentionLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Home,
    Therapy,
    School,
    Outdoor,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Home => write!(f, "home"),
            Environment::Therapy => write!(f, "therapy"),
            Environment::School => write!(f, "school"),
            Environment::Outdoor => write!(f, "outdoor"),
        }
    }
}

/// Plan type determines the required activity-count band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Daily,
    Weekly,
}

impl PlanType {
    /// (min, max) total activities required across all phases.
    pub fn activity_band(&self) -> (usize, usize) {
        match self {
            PlanType::Daily => (5, 7),
            PlanType::Weekly => (8, 12),
        }
    }

    /// Midpoint of the band; the fallback builder targets this count.
    pub fn target_count(&self) -> usize {
        let (min, max) = self.activity_band();
        (min + max) / 2
    }

    pub fn label(&self) -> &'static str {
        match self {
            PlanType::Daily => "Daily",
            PlanType::Weekly => "Weekly",
        }
    }
}

/// One recommendation request. Transient, one per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub budget: BudgetTier,
    #[serde(default)]
    pub available_materials: Vec<String>,
    pub attention_level: AttentionLevel,
    pub environment: Environment,
    pub plan_type: PlanType,
    #[serde(default)]
    pub time_available_minutes: Option<u32>,
}

/// Source data mixes string and list representations for materials, skills,
/// and step fields. Deserialized once, normalized to list form via
/// [`TextOrList::into_list`], never type-sniffed downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl Default for TextOrList {
    fn default() -> Self {
        TextOrList::Text(String::new())
    }
}

impl TextOrList {
    /// Normalize to a list, splitting text on `sep` and trimming entries.
    pub fn into_list(self, sep: char) -> Vec<String> {
        match self {
            TextOrList::Text(s) => s
                .split(sep)
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            TextOrList::List(items) => items
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

/// A corpus activity, immutable once indexed. Materials, skills, and steps
/// are already normalized to canonical list form at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: String,
    pub activity_name: String,
    pub domain: String,
    pub difficulty: String,
    pub goal: String,
    #[serde(default)]
    pub skills_targeted: Vec<String>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub step_instructions: Vec<String>,
    /// "min-max" string; unparsable ranges are treated as universally compatible.
    #[serde(default)]
    pub age_range: String,
    #[serde(default)]
    pub sensory_suitability: String,
    #[serde(default)]
    pub autism_level_suitability: String,
    #[serde(default)]
    pub environment_fit: String,
    #[serde(default)]
    pub cost_level: String,
    #[serde(default)]
    pub learning_style_fit: String,
    #[serde(default = "default_duration")]
    pub time_required_minutes: u32,
}

fn default_duration() -> u32 {
    15
}

impl ActivityRecord {
    /// Parse the "min-max" age range. None when the string is not in that form.
    pub fn parsed_age_range(&self) -> Option<(u8, u8)> {
        let (lo, hi) = self.age_range.split_once('-')?;
        let min = lo.trim().parse::<u8>().ok()?;
        let max = hi.trim().parse::<u8>().ok()?;
        Some((min, max))
    }

    /// Lenient age check: unparsable ranges pass.
    pub fn suits_age(&self, age: u8) -> bool {
        match self.parsed_age_range() {
            Some((min, max)) => min <= age && age <= max,
            None => true,
        }
    }
}

/// Caregiver-reported outcome for one attempted activity. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub profile_id: String,
    pub activity_id: String,
    #[serde(default)]
    pub activity_name: String,
    /// All three ratings are bounded 1..=5.
    pub engagement: u8,
    pub stress: u8,
    pub success: u8,
    #[serde(default)]
    pub notes: String,
    pub completed_at: DateTime<Utc>,
}

/// An activity record augmented with the similarity and reinforcement signals
/// computed for the current call. Lives only for one recommendation.
#[derive(Debug, Clone)]
pub struct ScoredActivity {
    pub record: ActivityRecord,
    pub similarity: f32,
    /// Semantic rank before reinforcement re-ordering (0 = most similar).
    pub semantic_rank: usize,
    /// Outcome-derived confidence in [0, 1]; 0.5 = no history.
    pub reinforcement_score: f64,
    /// Discrete boost multiplier from the ladder (0.5..=2.0).
    pub boost: f64,
}

/// Canonical phase names, in required order.
pub const PHASE_NAMES: [&str; 3] = ["Warm-up", "Core", "Calming"];

/// One activity slotted into a plan phase, adapted for the child.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledActivity {
    pub activity_id: String,
    pub activity_name: String,
    pub domain: String,
    pub description: String,
    pub recommended_duration_minutes: u32,
    pub difficulty_adaptation: String,
    pub why_this_activity_here: String,
    pub step_by_step: Vec<String>,
    pub sensory_considerations: String,
    pub expected_outcome: String,
}

/// One of the three plan phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPhase {
    pub phase: String,
    pub order: u32,
    pub activities: Vec<ScheduledActivity>,
}

/// The assembled plan. Structural invariants (three phases, activity band,
/// provenance, uniqueness) are enforced by the validator before a plan is
/// ever returned to a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredPlan {
    pub plan_type: String,
    pub plan_name: String,
    pub plan_overview: String,
    pub total_duration_minutes: u32,
    pub planning_rationale: String,
    #[serde(default)]
    pub materials_summary: Vec<String>,
    pub schedule: Vec<PlanPhase>,
}

impl StructuredPlan {
    pub fn total_activities(&self) -> usize {
        self.schedule.iter().map(|p| p.activities.len()).sum()
    }
}

/// What the engine hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub plan_id: Uuid,
    pub plan: StructuredPlan,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn age_range_parses_and_checks() {
        let mut rec = sample_record("a1");
        rec.age_range = "4-6".to_string();
        assert_eq!(rec.parsed_age_range(), Some((4, 6)));
        assert!(rec.suits_age(5));
        assert!(!rec.suits_age(8));
    }

    #[test]
    fn unparsable_age_range_is_lenient() {
        let mut rec = sample_record("a1");
        rec.age_range = "all ages".to_string();
        assert_eq!(rec.parsed_age_range(), None);
        assert!(rec.suits_age(3));
        assert!(rec.suits_age(17));
    }

    #[test]
    fn text_or_list_normalizes_both_forms() {
        let text = TextOrList::Text("colored paper, scissors , glue".to_string());
        assert_eq!(
            text.into_list(','),
            vec!["colored paper", "scissors", "glue"]
        );
        let list = TextOrList::List(vec![" blocks ".to_string(), String::new()]);
        assert_eq!(list.into_list(','), vec!["blocks"]);
    }

    #[test]
    fn plan_type_bands() {
        assert_eq!(PlanType::Daily.activity_band(), (5, 7));
        assert_eq!(PlanType::Daily.target_count(), 6);
        assert_eq!(PlanType::Weekly.activity_band(), (8, 12));
    }

    pub(crate) fn sample_record(id: &str) -> ActivityRecord {
        ActivityRecord {
            id: id.to_string(),
            activity_name: format!("Activity {id}"),
            domain: "motor".to_string(),
            difficulty: "easy".to_string(),
            goal: "motor skills".to_string(),
            skills_targeted: vec!["balance".to_string()],
            materials: vec!["ball".to_string()],
            step_instructions: vec!["Roll the ball".to_string()],
            age_range: "3-10".to_string(),
            sensory_suitability: "sensory-friendly".to_string(),
            autism_level_suitability: "Level 1 (mild support), Level 2 (moderate support)".to_string(),
            environment_fit: "home".to_string(),
            cost_level: "low".to_string(),
            learning_style_fit: "kinesthetic".to_string(),
            time_required_minutes: 15,
        }
    }
}
