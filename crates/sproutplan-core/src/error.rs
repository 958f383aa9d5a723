//! Error taxonomy for the recommendation pipeline.
//!
//! Only three categories ever reach a caller: missing profile, unavailable
//! corpus/index, and store failures. Collaborator misbehavior (timeouts,
//! malformed JSON, contract violations) is recovered locally via the
//! fallback plan and never surfaces as an error.

use thiserror::Error;

/// Result type for engine-level operations.
pub type RecommendResult<T> = Result<T, RecommendError>;

/// Typed failures surfaced to the upstream caller.
#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("profile {0} not found")]
    ProfileNotFound(String),

    #[error("activity index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("document store error: {0}")]
    Store(String),
}

/// Opaque failure from a profile or outcome store backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<StoreError> for RecommendError {
    fn from(err: StoreError) -> Self {
        RecommendError::Store(err.0)
    }
}

/// Errors from the activity index build/load path.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("corpus read failed: {0}")]
    Corpus(String),

    #[error("index file not found: {0}")]
    NotFound(String),

    #[error("index deserialization failed: {0}")]
    Deserialize(String),

    #[error("embedding dimension mismatch: index has {expected}, embedder produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the external generation collaborator. All variants are treated
/// uniformly by the engine: log, then fall back.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured")]
    NotConfigured,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("empty response from provider")]
    EmptyResponse,

    #[error("response parse failed: {0}")]
    Parse(String),
}
