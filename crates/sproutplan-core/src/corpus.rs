//! Corpus loading: one CSV row per activity, normalized once at load time.
//!
//! Raw rows mix string and list shapes for materials/skills/steps; the
//! [`TextOrList`] union absorbs that here so every downstream component sees
//! canonical `Vec<String>` fields.

use crate::error::IndexError;
use crate::model::{ActivityRecord, TextOrList};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Raw CSV row shape before normalization.
#[derive(Debug, Deserialize)]
struct RawActivityRow {
    id: String,
    activity_name: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default)]
    goal: String,
    #[serde(default)]
    skills_targeted: TextOrList,
    #[serde(default)]
    materials: TextOrList,
    #[serde(default)]
    step_instructions: TextOrList,
    #[serde(default)]
    age_range: String,
    #[serde(default)]
    sensory_suitability: String,
    #[serde(default)]
    autism_level_suitability: String,
    #[serde(default)]
    environment_fit: String,
    #[serde(default)]
    cost_level: String,
    #[serde(default)]
    learning_style_fit: String,
    #[serde(default = "default_minutes")]
    time_required_minutes: u32,
}

fn default_minutes() -> u32 {
    15
}

impl From<RawActivityRow> for ActivityRecord {
    fn from(raw: RawActivityRow) -> Self {
        ActivityRecord {
            id: raw.id,
            activity_name: raw.activity_name,
            domain: raw.domain,
            difficulty: raw.difficulty,
            goal: raw.goal,
            skills_targeted: raw.skills_targeted.into_list(','),
            materials: raw.materials.into_list(','),
            // Step text uses sentence periods as separators in the corpus.
            step_instructions: raw.step_instructions.into_list('.'),
            age_range: raw.age_range,
            sensory_suitability: raw.sensory_suitability,
            autism_level_suitability: raw.autism_level_suitability,
            environment_fit: raw.environment_fit,
            cost_level: raw.cost_level,
            learning_style_fit: raw.learning_style_fit,
            time_required_minutes: raw.time_required_minutes,
        }
    }
}

/// Load and normalize the activity corpus from a CSV file.
pub fn load_corpus(path: &Path) -> Result<Vec<ActivityRecord>, IndexError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| IndexError::Corpus(format!("{}: {e}", path.display())))?;
    let mut records = Vec::new();
    for row in reader.deserialize::<RawActivityRow>() {
        let raw = row.map_err(|e| IndexError::Corpus(e.to_string()))?;
        records.push(ActivityRecord::from(raw));
    }
    info!("Loaded {} activities from {}", records.len(), path.display());
    Ok(records)
}

/// Canonical text representation embedded for each activity. Field order and
/// labels are part of the embedding contract; changing them invalidates any
/// prebuilt index.
pub fn text_representation(activity: &ActivityRecord) -> String {
    [
        format!("Activity: {}", activity.activity_name),
        format!("Domain: {}", activity.domain),
        format!("Difficulty: {}", activity.difficulty),
        format!("Goal: {}", activity.goal),
        format!("Skills: {}", activity.skills_targeted.join(", ")),
        format!("Materials: {}", activity.materials.join(", ")),
        format!("Age range: {}", activity.age_range),
        format!("Sensory suitability: {}", activity.sensory_suitability),
        format!("Autism level: {}", activity.autism_level_suitability),
        format!("Environment: {}", activity.environment_fit),
        format!("Learning style: {}", activity.learning_style_fit),
        format!("Instructions: {}", activity.step_instructions.join(". ")),
    ]
    .join(" | ")
}
