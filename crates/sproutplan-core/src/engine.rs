//! Recommendation engine: the one entry point that runs the pipeline.
//!
//! Stages run exactly once, in order: search, score, curate, synthesize,
//! validate, accept-or-fallback. Collaborator failures (the generation
//! provider, contract-violating responses) are logged and recovered with the
//! deterministic fallback; only missing profiles, an unavailable index, and
//! store failures surface as errors.

use crate::config::EngineConfig;
use crate::curate;
use crate::embed::TextEmbedder;
use crate::error::{RecommendError, RecommendResult, StoreError};
use crate::index::{ActivityIndex, SearchFilters};
use crate::model::{ChildProfile, OutcomeRecord, PlanRequest, PlanResponse, StructuredPlan};
use crate::prompt::build_plan_prompt;
use crate::provider::PlanGenerator;
use crate::scorer::{self, ActivityScorer};
use crate::synthesize;
use crate::validate::validate_plan;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Read access to child profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, profile_id: &str) -> Result<Option<ChildProfile>, StoreError>;
}

/// Read access to caregiver outcome history. Implementations return outcomes
/// newest-first, at most `limit` of them.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn recent_outcomes(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<OutcomeRecord>, StoreError>;
}

/// In-memory store, for tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryStore {
    profiles: RwLock<BTreeMap<String, ChildProfile>>,
    outcomes: RwLock<BTreeMap<String, Vec<OutcomeRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_profile(&self, profile: ChildProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile);
    }

    pub async fn record_outcome(&self, outcome: OutcomeRecord) {
        self.outcomes
            .write()
            .await
            .entry(outcome.profile_id.clone())
            .or_default()
            .push(outcome);
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn fetch_profile(&self, profile_id: &str) -> Result<Option<ChildProfile>, StoreError> {
        Ok(self.profiles.read().await.get(profile_id).cloned())
    }
}

#[async_trait]
impl OutcomeStore for InMemoryStore {
    async fn recent_outcomes(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<OutcomeRecord>, StoreError> {
        let guard = self.outcomes.read().await;
        let mut list = guard.get(profile_id).cloned().unwrap_or_default();
        list.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        list.truncate(limit);
        Ok(list)
    }
}

/// The pipeline orchestrator. One instance serves many concurrent calls;
/// every per-call signal (scores, boosts, the curated pool) is rebuilt fresh
/// each time.
pub struct RecommendationEngine {
    config: EngineConfig,
    index: ActivityIndex,
    embedder: Arc<dyn TextEmbedder>,
    profiles: Arc<dyn ProfileStore>,
    outcomes: Arc<dyn OutcomeStore>,
    generator: Option<Arc<dyn PlanGenerator>>,
}

impl RecommendationEngine {
    pub fn new(
        config: EngineConfig,
        index: ActivityIndex,
        embedder: Arc<dyn TextEmbedder>,
        profiles: Arc<dyn ProfileStore>,
        outcomes: Arc<dyn OutcomeStore>,
        generator: Option<Arc<dyn PlanGenerator>>,
    ) -> Self {
        Self {
            config,
            index,
            embedder,
            profiles,
            outcomes,
            generator,
        }
    }

    /// Produce a structured activity plan for the given profile. Always
    /// returns a plan when the profile exists and the index is usable, even
    /// if the generation collaborator is down or misbehaving.
    pub async fn recommend(
        &self,
        profile_id: &str,
        request: &PlanRequest,
    ) -> RecommendResult<PlanResponse> {
        let profile = self
            .profiles
            .fetch_profile(profile_id)
            .await?
            .ok_or_else(|| RecommendError::ProfileNotFound(profile_id.to_string()))?;

        let outcomes = self
            .outcomes
            .recent_outcomes(profile_id, self.config.outcome_window)
            .await?;
        info!(
            "Generating {} plan for profile {} ({} recent outcomes)",
            request.plan_type.label(),
            profile_id,
            outcomes.len()
        );

        let base_query = build_search_query(&profile, request);
        let query = scorer::enhance_query(&base_query, &outcomes);
        debug!("Search query: {query}");

        let filters = SearchFilters {
            age: Some(profile.age),
            sensory_sensitivity: Some(profile.sensory_sensitivity.clone()),
            autism_level: Some(profile.autism_level),
        };
        let hits = self
            .index
            .search(
                self.embedder.as_ref(),
                &query,
                self.config.search_k,
                &filters,
            )
            .map_err(|e| RecommendError::IndexUnavailable(e.to_string()))?;

        let activity_scorer = ActivityScorer::from_outcomes(self.config.scoring.clone(), &outcomes);
        let candidates = curate::curate(
            &self.config.curation,
            &profile,
            request,
            hits,
            &activity_scorer,
        );
        debug!("Curated pool: {} candidates", candidates.len());

        let context = &outcomes[..outcomes.len().min(self.config.context_outcomes)];
        let plan = self
            .synthesize_or_fallback(&profile, request, &candidates, context)
            .await;

        Ok(PlanResponse {
            plan_id: Uuid::new_v4(),
            plan,
            generated_at: Utc::now(),
        })
    }

    async fn synthesize_or_fallback(
        &self,
        profile: &ChildProfile,
        request: &PlanRequest,
        candidates: &[crate::model::ScoredActivity],
        context: &[OutcomeRecord],
    ) -> StructuredPlan {
        let Some(generator) = &self.generator else {
            debug!("No generation provider configured; using fallback plan");
            return synthesize::build_fallback_plan(candidates, request);
        };

        let prompt = build_plan_prompt(profile, candidates, request, context);
        let raw = match generator.generate(&prompt.system, &prompt.user).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("Plan generation failed ({err}); using fallback plan");
                return synthesize::build_fallback_plan(candidates, request);
            }
        };

        let plan = match synthesize::parse_plan_response(&raw, candidates, request) {
            Ok(plan) => plan,
            Err(err) => {
                let head: String = raw.chars().take(200).collect();
                warn!("Unusable plan response ({err}); response head: {head}");
                return synthesize::build_fallback_plan(candidates, request);
            }
        };

        let candidate_ids: HashSet<String> =
            candidates.iter().map(|c| c.record.id.clone()).collect();
        match validate_plan(&plan, request.plan_type, &candidate_ids) {
            Ok(()) => {
                info!(
                    "Accepted generated plan: {} activities",
                    plan.total_activities()
                );
                plan
            }
            Err(violation) => {
                let head: String = raw.chars().take(200).collect();
                warn!("Generated plan rejected ({violation}); response head: {head}");
                synthesize::build_fallback_plan(candidates, request)
            }
        }
    }
}

/// Assemble the semantic search query from profile and request. Goals are
/// emphasized with three phrasings each so they dominate the embedding.
pub fn build_search_query(profile: &ChildProfile, request: &PlanRequest) -> String {
    let mut parts = Vec::new();
    for goal in &profile.goals {
        parts.push(format!("activities for {goal}"));
        parts.push(format!("{goal} development"));
        parts.push(format!("{goal} skills"));
    }
    parts.push(format!("suitable for autism {}", profile.autism_level));
    parts.push(format!("{} communication", profile.communication_level));
    parts.push(format!("{} budget", request.budget));
    if !request.available_materials.is_empty() {
        parts.push(format!("using {}", request.available_materials.join(", ")));
    }
    parts.push(format!("{} attention span", request.attention_level));
    parts.push(format!("{} environment", request.environment));
    parts.push(format!("age {} years", profile.age));
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::embed::HashingEmbedder;
    use crate::error::ProviderError;
    use crate::model::tests::sample_record;
    use crate::model::{
        AttentionLevel, AutismLevel, BudgetTier, CommunicationLevel, Environment, Goal, PlanType,
        SensoryProfile,
    };
    use chrono::Duration;

    struct FailingGenerator;

    #[async_trait]
    impl PlanGenerator for FailingGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Transport("connection timed out".to_string()))
        }
    }

    struct CannedGenerator(String);

    #[async_trait]
    impl PlanGenerator for CannedGenerator {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
    }

    fn profile() -> ChildProfile {
        ChildProfile {
            id: "child-1".to_string(),
            name: "Sam".to_string(),
            age: 6,
            communication_level: CommunicationLevel::Limited,
            autism_level: AutismLevel::Level2,
            sensory_sensitivity: SensoryProfile::default(),
            goals: vec![Goal::Motor],
        }
    }

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

    fn engine_with(generator: Option<Arc<dyn PlanGenerator>>) -> (RecommendationEngine, Arc<InMemoryStore>) {
        let records: Vec<_> = (1..=20).map(|i| sample_record(&format!("a{i}"))).collect();
        let embedder = Arc::new(HashingEmbedder::default());
        let index = ActivityIndex::build(records, embedder.as_ref());
        let store = Arc::new(InMemoryStore::new());
        let engine = RecommendationEngine::new(
            EngineConfig::default(),
            index,
            embedder,
            store.clone(),
            store.clone(),
            generator,
        );
        (engine, store)
    }

    #[tokio::test]
    async fn unknown_profile_is_an_error() {
        let (engine, _store) = engine_with(None);
        let err = engine.recommend("ghost", &request()).await.unwrap_err();
        assert!(matches!(err, RecommendError::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_valid_plan() {
        let (engine, store) = engine_with(Some(Arc::new(FailingGenerator)));
        store.insert_profile(profile()).await;
        let response = engine.recommend("child-1", &request()).await.unwrap();
        let plan = &response.plan;
        assert_eq!(plan.schedule.len(), 3);
        assert_eq!(plan.total_activities(), 6);
        assert!(plan.schedule.iter().all(|p| !p.activities.is_empty()));
        assert!(plan.total_duration_minutes >= 30);
    }

    #[tokio::test]
    async fn garbage_response_falls_back() {
        let (engine, store) = engine_with(Some(Arc::new(CannedGenerator(
            "I'm sorry, I can't produce JSON today.".to_string(),
        ))));
        store.insert_profile(profile()).await;
        let response = engine.recommend("child-1", &request()).await.unwrap();
        assert_eq!(response.plan.schedule.len(), 3);
        assert_eq!(response.plan.total_activities(), 6);
    }

    #[tokio::test]
    async fn no_generator_uses_fallback() {
        let (engine, store) = engine_with(None);
        store.insert_profile(profile()).await;
        let response = engine.recommend("child-1", &request()).await.unwrap();
        assert_eq!(response.plan.total_activities(), 6);
    }

    #[tokio::test]
    async fn outcomes_flow_into_the_pipeline() {
        let (engine, store) = engine_with(None);
        store.insert_profile(profile()).await;
        for i in 0..3 {
            store
                .record_outcome(OutcomeRecord {
                    profile_id: "child-1".to_string(),
                    activity_id: "a1".to_string(),
                    activity_name: "Activity a1".to_string(),
                    engagement: 5,
                    stress: 1,
                    success: 5,
                    notes: String::new(),
                    completed_at: Utc::now() - Duration::hours(i),
                })
                .await;
        }
        let response = engine.recommend("child-1", &request()).await.unwrap();
        assert_eq!(response.plan.schedule.len(), 3);
    }

    #[tokio::test]
    async fn in_memory_store_bounds_and_orders_outcomes() {
        let store = InMemoryStore::new();
        for i in 0..15 {
            store
                .record_outcome(OutcomeRecord {
                    profile_id: "p".to_string(),
                    activity_id: format!("a{i}"),
                    activity_name: String::new(),
                    engagement: 3,
                    stress: 3,
                    success: 3,
                    notes: String::new(),
                    completed_at: Utc::now() - Duration::hours(i),
                })
                .await;
        }
        let recent = store.recent_outcomes("p", 10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].activity_id, "a0");
    }

    #[test]
    fn search_query_emphasizes_goals() {
        let query = build_search_query(&profile(), &request());
        assert!(query.contains("activities for motor"));
        assert!(query.contains("motor development"));
        assert!(query.contains("motor skills"));
        assert!(query.contains("age 6 years"));
        assert!(query.contains("Level 2"));
    }

    #[test]
    fn provider_config_without_url_yields_no_generator() {
        let cfg = ProviderConfig::default();
        assert!(crate::provider::ChatCompletionProvider::from_config(&cfg).is_err());
    }
}
