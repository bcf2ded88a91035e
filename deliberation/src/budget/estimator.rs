//! Token estimation: exact tokenizer counts with a conservative heuristic fallback.
//!
//! Downstream budgeting treats every estimate as an upper bound, so the
//! heuristic deliberately over-counts: English text averages 3-4 characters
//! per token and we divide by 3.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Characters per token assumed by the heuristic estimator and by
/// character-based cut points in the truncator.
pub const CHARS_PER_TOKEN: usize = 3;

/// Which estimation path is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorMode {
    /// Counts come from a real subword tokenizer.
    Exact,
    /// Counts come from `ceil(chars / 3)`.
    Heuristic,
}

impl std::fmt::Display for EstimatorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// Subword tokenizer used for exact counting and token-boundary cuts.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode a token id slice back into text.
    fn decode(&self, tokens: &[u32]) -> String;
}

/// Trait for estimating token counts from text.
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text. Empty text is 0.
    fn estimate(&self, text: &str) -> usize;

    /// Which estimation path this estimator uses.
    fn mode(&self) -> EstimatorMode;
}

/// Character-count estimator: `ceil(chars / 3)`.
///
/// Counts Unicode scalar values rather than bytes so multi-byte text is not
/// penalised twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(CHARS_PER_TOKEN)
    }

    fn mode(&self) -> EstimatorMode {
        EstimatorMode::Heuristic
    }
}

/// Exact estimator backed by a [`Tokenizer`].
#[derive(Clone)]
pub struct TokenizerEstimator {
    tokenizer: Arc<dyn Tokenizer>,
}

impl TokenizerEstimator {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// The wrapped tokenizer.
    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }
}

impl std::fmt::Debug for TokenizerEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerEstimator").finish_non_exhaustive()
    }
}

impl TokenEstimator for TokenizerEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.tokenizer.encode(text).len()
    }

    fn mode(&self) -> EstimatorMode {
        EstimatorMode::Exact
    }
}
