//! Engine configuration loaded from environment or a TOML file.
//!
//! The avoid/boost thresholds and the discrete boost ladder are product
//! constants with no stated derivation; they are kept here as named,
//! overridable fields rather than inlined literals so they can be reviewed
//! and tuned without code edits.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | SPROUTPLAN_SEARCH_K | 50 | Candidates requested from the index per call. |
//! | SPROUTPLAN_LLM_API_URL | (none) | OpenAI-compatible chat completions endpoint. |
//! | SPROUTPLAN_LLM_API_KEY | (none) | Bearer key for the endpoint. |
//! | SPROUTPLAN_LLM_MODEL | llama3.1 | Model name sent with each request. |
//! | SPROUTPLAN_LLM_TIMEOUT_SECS | 120 | Hard ceiling on the generation call. |

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Reinforcement scoring constants. Score = 0.4·engagement + 0.4·success
/// + 0.2·(1 − stress) plus bounded reliability/recency bonuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight on normalized average engagement.
    #[serde(default = "default_engagement_weight")]
    pub engagement_weight: f64,
    /// Weight on normalized average success.
    #[serde(default = "default_success_weight")]
    pub success_weight: f64,
    /// Weight on inverted normalized average stress.
    #[serde(default = "default_stress_weight")]
    pub stress_weight: f64,
    /// Per-outcome reliability bonus, capped at `reliability_cap`.
    #[serde(default = "default_reliability_per_outcome")]
    pub reliability_per_outcome: f64,
    #[serde(default = "default_reliability_cap")]
    pub reliability_cap: f64,
    /// Scale of the recency bonus derived from the 3 most recent successes.
    #[serde(default = "default_recency_scale")]
    pub recency_scale: f64,
    /// Outcomes retained in the per-activity recent window.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// Recent outcomes examined for the recency bonus and the avoid rule.
    #[serde(default = "default_recent_sample")]
    pub recent_sample: usize,
    /// Avoid rule: at least this many outcomes on record.
    #[serde(default = "default_avoid_min_outcomes")]
    pub avoid_min_outcomes: usize,
    /// Avoid rule: recent average stress at or above this value.
    #[serde(default = "default_avoid_stress_floor")]
    pub avoid_stress_floor: f64,
    /// Avoid rule: recent average success at or below this value.
    #[serde(default = "default_avoid_success_ceiling")]
    pub avoid_success_ceiling: f64,
    /// Boost ladder, highest tier first: (score floor, multiplier).
    /// Deliberately a step function so re-ranking stays auditable.
    #[serde(default = "default_boost_ladder")]
    pub boost_ladder: Vec<(f64, f64)>,
    /// Multiplier when the score falls below every ladder tier.
    #[serde(default = "default_boost_floor")]
    pub boost_floor: f64,
}

fn default_engagement_weight() -> f64 {
    0.4
}
fn default_success_weight() -> f64 {
    0.4
}
fn default_stress_weight() -> f64 {
    0.2
}
fn default_reliability_per_outcome() -> f64 {
    0.01
}
fn default_reliability_cap() -> f64 {
    0.1
}
fn default_recency_scale() -> f64 {
    0.1
}
fn default_recent_window() -> usize {
    10
}
fn default_recent_sample() -> usize {
    3
}
fn default_avoid_min_outcomes() -> usize {
    2
}
fn default_avoid_stress_floor() -> f64 {
    4.0
}
fn default_avoid_success_ceiling() -> f64 {
    2.0
}
fn default_boost_ladder() -> Vec<(f64, f64)> {
    vec![(0.8, 2.0), (0.6, 1.5), (0.4, 1.0), (0.2, 0.75)]
}
fn default_boost_floor() -> f64 {
    0.5
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            engagement_weight: default_engagement_weight(),
            success_weight: default_success_weight(),
            stress_weight: default_stress_weight(),
            reliability_per_outcome: default_reliability_per_outcome(),
            reliability_cap: default_reliability_cap(),
            recency_scale: default_recency_scale(),
            recent_window: default_recent_window(),
            recent_sample: default_recent_sample(),
            avoid_min_outcomes: default_avoid_min_outcomes(),
            avoid_stress_floor: default_avoid_stress_floor(),
            avoid_success_ceiling: default_avoid_success_ceiling(),
            boost_ladder: default_boost_ladder(),
            boost_floor: default_boost_floor(),
        }
    }
}

/// Curation limits for diversity shaping and the candidate pool handed to
/// the synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationConfig {
    /// Items admitted unconditionally per distinct (domain, goal) key.
    #[serde(default = "default_unconditional_per_key")]
    pub unconditional_per_key: usize,
    /// Ceiling on accumulated diverse candidates.
    #[serde(default = "default_diversity_ceiling")]
    pub diversity_ceiling: usize,
    /// Pool multiplier: hand the synthesizer at least `pool_multiplier ×`
    /// the minimum plan size (floored at `pool_floor`) so it has real choice.
    #[serde(default = "default_pool_multiplier")]
    pub pool_multiplier: usize,
    #[serde(default = "default_pool_floor")]
    pub pool_floor: usize,
}

fn default_unconditional_per_key() -> usize {
    10
}
fn default_diversity_ceiling() -> usize {
    30
}
fn default_pool_multiplier() -> usize {
    6
}
fn default_pool_floor() -> usize {
    40
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            unconditional_per_key: default_unconditional_per_key(),
            diversity_ceiling: default_diversity_ceiling(),
            pool_multiplier: default_pool_multiplier(),
            pool_floor: default_pool_floor(),
        }
    }
}

/// External generation collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible `/chat/completions` endpoint.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_model() -> String {
    "llama3.1".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4000
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Raw candidates requested from the index per recommendation call.
    #[serde(default = "default_search_k")]
    pub search_k: usize,
    /// Recent outcomes fetched per profile (learning window).
    #[serde(default = "default_outcome_window")]
    pub outcome_window: usize,
    /// Outcomes embedded verbatim in the prompt for context.
    #[serde(default = "default_context_outcomes")]
    pub context_outcomes: usize,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub curation: CurationConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_k: default_search_k(),
            outcome_window: default_outcome_window(),
            context_outcomes: default_context_outcomes(),
            scoring: ScoringConfig::default(),
            curation: CurationConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

fn default_search_k() -> usize {
    50
}
fn default_outcome_window() -> usize {
    10
}
fn default_context_outcomes() -> usize {
    3
}

impl EngineConfig {
    /// Load overrides from environment. Unset or invalid values keep defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(k) = env_parse::<usize>("SPROUTPLAN_SEARCH_K") {
            cfg.search_k = k;
        }
        cfg.provider.api_url = env_opt_string("SPROUTPLAN_LLM_API_URL");
        cfg.provider.api_key = env_opt_string("SPROUTPLAN_LLM_API_KEY");
        if let Some(model) = env_opt_string("SPROUTPLAN_LLM_MODEL") {
            cfg.provider.model = model;
        }
        if cfg.provider.model.is_empty() {
            cfg.provider.model = default_model();
        }
        if let Some(t) = env_parse::<u64>("SPROUTPLAN_LLM_TIMEOUT_SECS") {
            cfg.provider.timeout_secs = t;
        }
        if cfg.provider.timeout_secs == 0 {
            cfg.provider.timeout_secs = default_timeout_secs();
        }
        cfg
    }

    /// Load from a TOML file, falling back to defaults for missing fields.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let cfg: EngineConfig = toml::from_str(&content)?;
        Ok(cfg)
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.search_k, 50);
        assert_eq!(cfg.outcome_window, 10);
        let s = &cfg.scoring;
        assert_eq!(s.avoid_min_outcomes, 2);
        assert_eq!(s.avoid_stress_floor, 4.0);
        assert_eq!(s.avoid_success_ceiling, 2.0);
        assert_eq!(s.boost_ladder.first(), Some(&(0.8, 2.0)));
        assert_eq!(s.boost_floor, 0.5);
        assert_eq!(cfg.provider.timeout_secs, 120);
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
            search_k = 25

            [provider]
            model = "gpt-4-turbo-preview"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.search_k, 25);
        assert_eq!(parsed.provider.model, "gpt-4-turbo-preview");
        assert_eq!(parsed.provider.timeout_secs, 120);
        assert_eq!(parsed.curation.diversity_ceiling, 30);
    }
}
