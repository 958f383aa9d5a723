//! sproutplan-core: recommendation and synthesis core for children's
//! developmental activity plans.
//!
//! The pipeline turns a child profile, a caregiver request, and recorded
//! activity outcomes into a structured three-phase plan: semantic search over
//! an embedded activity corpus, reinforcement scoring from outcome history,
//! safety/materials/diversity curation, plan synthesis via an external chat
//! collaborator, and a hard validation gate with a deterministic fallback.

mod config;
mod corpus;
mod curate;
mod embed;
mod engine;
mod error;
mod index;
mod model;
mod prompt;
mod provider;
mod scorer;
mod synthesize;
mod validate;

// Data model
pub use model::{
    ActivityRecord, AttentionLevel, AutismLevel, BudgetTier, ChildProfile, CommunicationLevel,
    Environment, Goal, OutcomeRecord, PlanPhase, PlanRequest, PlanResponse, PlanType,
    ScheduledActivity, ScoredActivity, Sensitivity, SensoryProfile, StructuredPlan, TextOrList,
    PHASE_NAMES,
};

// Configuration
pub use config::{CurationConfig, EngineConfig, ProviderConfig, ScoringConfig};

// Errors
pub use error::{IndexError, ProviderError, RecommendError, RecommendResult, StoreError};

// Activity index (embedding + nearest-neighbor search)
pub use corpus::{load_corpus, text_representation};
pub use embed::{HashingEmbedder, TextEmbedder, DEFAULT_DIMENSION};
pub use index::{ActivityIndex, SearchFilters, SearchHit, METADATA_FILE, VECTORS_FILE};

// Outcome scoring
pub use scorer::{enhance_query, ActivityScorer};

// Curation
pub use curate::{
    apply_reinforcement, apply_safety_filters, curate, ensure_variety, strict_filter_by_materials,
};

// Synthesis
pub use prompt::{build_plan_prompt, PlanPrompt, SYSTEM_PROMPT};
pub use provider::{ChatCompletionProvider, PlanGenerator};
pub use synthesize::{
    build_fallback_plan, parse_plan_response, strip_code_fences, SynthesisRejection,
};

// Validation
pub use validate::{
    has_calming_activity, validate_activity_count, validate_no_duplicates, validate_phase_structure,
    validate_plan, validate_provenance, PlanViolation,
};

// Engine
pub use engine::{
    build_search_query, InMemoryStore, OutcomeStore, ProfileStore, RecommendationEngine,
};
