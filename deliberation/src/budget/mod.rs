//! Prompt context budgeting.
//!
//! Guarantees every generation call receives input that fits its context
//! window, using lossy truncation that keeps the most decision-relevant text.
//!
//! # Modules
//!
//! - [`estimator`]: token counting, exact or heuristic
//! - [`truncate`]: middle- and tail-preserving truncation
//! - [`clamp`]: shared-budget clamping of several named blocks
//! - [`prompt_budget`]: content budget derived from configuration

pub mod clamp;
pub mod estimator;
pub mod prompt_budget;
pub mod truncate;

pub use clamp::{ClampedBlocks, BLOCK_SEPARATOR};
pub use estimator::{
    EstimatorMode, HeuristicEstimator, TokenEstimator, Tokenizer, TokenizerEstimator,
    CHARS_PER_TOKEN,
};
pub use prompt_budget::PromptBudget;
pub use truncate::{Truncator, TRUNCATION_MARKER};

/// Heuristic token estimate (`ceil(chars / 3)`).
pub fn estimate_tokens(text: &str) -> usize {
    HeuristicEstimator.estimate(text)
}

/// Middle truncation with the heuristic backend.
pub fn truncate_middle(text: &str, max_tokens: usize) -> String {
    Truncator::heuristic().truncate_middle(text, max_tokens)
}

/// Tail truncation with the heuristic backend.
pub fn truncate_tail(text: &str, max_tokens: usize) -> String {
    Truncator::heuristic().truncate_tail(text, max_tokens)
}

/// Multi-block clamp with the heuristic backend.
pub fn clamp_many_blocks(blocks: &[(&str, &str)], total_tokens: usize) -> ClampedBlocks {
    Truncator::heuristic().clamp_many_blocks(blocks, total_tokens)
}
