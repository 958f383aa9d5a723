//! Outcome-driven activity scoring.
//!
//! A pure function of the supplied outcome history: the scorer is rebuilt
//! per recommendation call from one profile's recent outcomes and never
//! shared across requests, so concurrent calls cannot observe stale state.

use crate::config::ScoringConfig;
use crate::model::OutcomeRecord;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct OutcomeTuple {
    engagement: u8,
    success: u8,
    stress: u8,
    completed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Default, Clone)]
struct ActivityStats {
    count: usize,
    total_engagement: u64,
    total_success: u64,
    total_stress: u64,
    /// Newest first, bounded to the configured recent window.
    recent: Vec<OutcomeTuple>,
}

/// Per-activity aggregates over one profile's outcome history.
pub struct ActivityScorer {
    config: ScoringConfig,
    stats: HashMap<String, ActivityStats>,
}

impl ActivityScorer {
    /// Accumulate stats from an outcome list (expected newest first, bounded
    /// upstream to the learning window).
    pub fn from_outcomes(config: ScoringConfig, outcomes: &[OutcomeRecord]) -> Self {
        let mut stats: HashMap<String, ActivityStats> = HashMap::new();
        for outcome in outcomes {
            if outcome.activity_id.is_empty() {
                continue;
            }
            let entry = stats.entry(outcome.activity_id.clone()).or_default();
            entry.count += 1;
            entry.total_engagement += u64::from(outcome.engagement);
            entry.total_success += u64::from(outcome.success);
            entry.total_stress += u64::from(outcome.stress);
            entry.recent.push(OutcomeTuple {
                engagement: outcome.engagement,
                success: outcome.success,
                stress: outcome.stress,
                completed_at: outcome.completed_at,
            });
        }
        for entry in stats.values_mut() {
            entry
                .recent
                .sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
            entry.recent.truncate(config.recent_window);
        }
        debug!(
            "Scorer built from {} outcomes across {} activities",
            outcomes.len(),
            stats.len()
        );
        Self { config, stats }
    }

    /// Confidence score in [0, 1]. Activities with no history score 0.5.
    pub fn score(&self, activity_id: &str) -> f64 {
        let Some(stats) = self.stats.get(activity_id) else {
            return 0.5;
        };
        if stats.count == 0 {
            return 0.5;
        }
        let n = stats.count as f64;
        let avg_engagement = stats.total_engagement as f64 / n;
        let avg_success = stats.total_success as f64 / n;
        let avg_stress = stats.total_stress as f64 / n;

        // Ratings are 1..=5; normalize to 0..=1.
        let engagement_score = (avg_engagement - 1.0) / 4.0;
        let success_score = (avg_success - 1.0) / 4.0;
        let stress_penalty = (avg_stress - 1.0) / 4.0;

        let cfg = &self.config;
        let base = cfg.engagement_weight * engagement_score
            + cfg.success_weight * success_score
            + cfg.stress_weight * (1.0 - stress_penalty);

        let reliability = (n * cfg.reliability_per_outcome).min(cfg.reliability_cap);

        let recency = if stats.recent.is_empty() {
            0.0
        } else {
            let sample = &stats.recent[..stats.recent.len().min(cfg.recent_sample)];
            let recent_avg_success =
                sample.iter().map(|o| f64::from(o.success)).sum::<f64>() / sample.len() as f64;
            ((recent_avg_success - 1.0) / 4.0) * cfg.recency_scale
        };

        (base + reliability + recency).clamp(0.0, 1.0)
    }

    /// Discrete boost multiplier from the configured ladder.
    pub fn boost(&self, activity_id: &str) -> f64 {
        let score = self.score(activity_id);
        for &(floor, multiplier) in &self.config.boost_ladder {
            if score >= floor {
                return multiplier;
            }
        }
        self.config.boost_floor
    }

    /// True when recent outcomes show high stress and low success. Avoided
    /// activities are removed from the pool entirely, not down-ranked.
    pub fn should_avoid(&self, activity_id: &str) -> bool {
        let Some(stats) = self.stats.get(activity_id) else {
            return false;
        };
        if stats.count < self.config.avoid_min_outcomes || stats.recent.is_empty() {
            return false;
        }
        let sample = &stats.recent[..stats.recent.len().min(self.config.recent_sample)];
        let avg_stress =
            sample.iter().map(|o| f64::from(o.stress)).sum::<f64>() / sample.len() as f64;
        let avg_success =
            sample.iter().map(|o| f64::from(o.success)).sum::<f64>() / sample.len() as f64;
        if avg_stress >= self.config.avoid_stress_floor
            && avg_success <= self.config.avoid_success_ceiling
        {
            warn!(
                "Activity {activity_id} marked to avoid: recent stress {avg_stress:.2}, success {avg_success:.2}"
            );
            return true;
        }
        false
    }
}

/// Append learning signals from recent outcomes to a search query.
pub fn enhance_query(base_query: &str, outcomes: &[OutcomeRecord]) -> String {
    if outcomes.is_empty() {
        return base_query.to_string();
    }

    let mut successful = 0usize;
    let mut unsuccessful = 0usize;
    for outcome in outcomes {
        if outcome.engagement >= 4 && outcome.success >= 4 && outcome.stress <= 2 {
            successful += 1;
        } else if outcome.engagement <= 2 || outcome.success <= 2 || outcome.stress >= 4 {
            unsuccessful += 1;
        }
    }

    let mut parts = vec![base_query.to_string()];
    if successful > 0 {
        parts.push("Similar to activities that were highly engaging and successful".to_string());
    }
    if unsuccessful > 0 {
        parts.push("Avoid activities similar to those with low engagement or high stress".to_string());
    }

    let high_engagement = outcomes.iter().filter(|o| o.engagement >= 4).count();
    if high_engagement as f64 >= outcomes.len() as f64 * 0.7 {
        parts.push("Focus on highly engaging activities".to_string());
    }

    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn outcome(activity_id: &str, engagement: u8, stress: u8, success: u8, age_mins: i64) -> OutcomeRecord {
        OutcomeRecord {
            profile_id: "p1".to_string(),
            activity_id: activity_id.to_string(),
            activity_name: format!("Activity {activity_id}"),
            engagement,
            stress,
            success,
            notes: String::new(),
            completed_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn scorer(outcomes: &[OutcomeRecord]) -> ActivityScorer {
        ActivityScorer::from_outcomes(ScoringConfig::default(), outcomes)
    }

    #[test]
    fn no_history_is_neutral() {
        let s = scorer(&[]);
        assert_eq!(s.score("unknown"), 0.5);
        assert_eq!(s.boost("unknown"), 1.0);
        assert!(!s.should_avoid("unknown"));
    }

    #[test]
    fn score_is_monotone_in_success() {
        let better = scorer(&[
            outcome("a", 4, 2, 5, 10),
            outcome("a", 4, 2, 5, 20),
        ]);
        let worse = scorer(&[
            outcome("a", 4, 2, 3, 10),
            outcome("a", 4, 2, 3, 20),
        ]);
        assert!(better.score("a") >= worse.score("a"));
    }

    #[test]
    fn boost_ladder_tiers() {
        // All-max outcomes land in the top tier.
        let great = scorer(&[
            outcome("a", 5, 1, 5, 10),
            outcome("a", 5, 1, 5, 20),
            outcome("a", 5, 1, 5, 30),
        ]);
        assert!(great.score("a") >= 0.8);
        assert_eq!(great.boost("a"), 2.0);

        // All-min outcomes land at the floor.
        let awful = scorer(&[
            outcome("b", 1, 5, 1, 10),
            outcome("b", 1, 5, 1, 20),
        ]);
        assert!(awful.score("b") < 0.2);
        assert_eq!(awful.boost("b"), 0.5);
    }

    #[test]
    fn avoid_rule_requires_stress_and_failure() {
        let bad = scorer(&[
            outcome("a", 2, 5, 1, 10),
            outcome("a", 2, 5, 1, 20),
            outcome("a", 2, 5, 1, 30),
        ]);
        assert!(bad.should_avoid("a"));

        // High stress alone is not enough when success is fine.
        let stressed = scorer(&[
            outcome("b", 4, 5, 4, 10),
            outcome("b", 4, 5, 4, 20),
        ]);
        assert!(!stressed.should_avoid("b"));

        // A single bad outcome does not trip the rule.
        let once = scorer(&[outcome("c", 1, 5, 1, 10)]);
        assert!(!once.should_avoid("c"));
    }

    #[test]
    fn recent_window_uses_newest_outcomes() {
        // Old failures, recent wins: recency bonus reflects the recent three.
        let mixed = scorer(&[
            outcome("a", 5, 1, 5, 10),
            outcome("a", 5, 1, 5, 20),
            outcome("a", 5, 1, 5, 30),
            outcome("a", 1, 5, 1, 5000),
            outcome("a", 1, 5, 1, 6000),
        ]);
        assert!(!mixed.should_avoid("a"));
    }

    #[test]
    fn query_enhancement_adds_signals() {
        let base = "Activities specifically targeting: motor";
        assert_eq!(enhance_query(base, &[]), base);

        let enhanced = enhance_query(
            base,
            &[
                outcome("a", 5, 1, 5, 10),
                outcome("b", 1, 5, 1, 20),
            ],
        );
        assert!(enhanced.starts_with(base));
        assert!(enhanced.contains("highly engaging and successful"));
        assert!(enhanced.contains("Avoid activities similar"));
    }
}
