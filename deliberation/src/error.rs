//! Error taxonomy for the deliberation core.
//!
//! Budget problems never appear here: bad budgets are coerced, not reported.
//! Generation failures are never retried at this layer; they abort the run
//! and surface to the caller with the originating error attached.

use thiserror::Error;

use crate::pipeline::IllegalTransition;
use crate::state::ReportKind;

/// Failure from the external text-generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Network, timeout or backend failure.
    #[error("inference failure: {0}")]
    Inference(String),

    /// Provider rejected the call for rate limiting.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// The provider answered but the reply was unusable.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Failure from the similarity memory capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory backend failure: {0}")]
    Backend(String),

    /// The embedding provider asked us to slow down.
    #[error("memory backend rate limited: {0}")]
    RateLimit(String),
}

/// Failure inside an analyst report stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// The data feed could not supply raw material.
    #[error("data feed failure: {0}")]
    DataFeed(String),

    /// The analyst produced no text.
    #[error("{0} analyst produced an empty report")]
    EmptyReport(ReportKind),
}

/// Top-level error for a deliberation run.
#[derive(Debug, Error)]
pub enum DeliberationError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("memory lookup failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("{kind} analyst stage failed: {source}")]
    Stage {
        kind: ReportKind,
        #[source]
        source: StageError,
    },

    /// A stage ran before an input it depends on was produced.
    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    /// A write-once field was written twice.
    #[error("{0} is already set")]
    AlreadySet(&'static str),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl DeliberationError {
    /// Whether the underlying cause came from the generation capability.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            Self::Generation(_)
                | Self::Stage {
                    source: StageError::Generation(_),
                    ..
                }
        )
    }
}
