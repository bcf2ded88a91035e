//! Prompt budget: tokens available for input after reserving model output.

use serde::{Deserialize, Serialize};

/// Default total input ceiling.
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 12_000;
/// Default tokens reserved for generation output.
pub const DEFAULT_RESERVED_OUTPUT_TOKENS: usize = 2_048;

/// Immutable input budget derived from configuration.
///
/// Non-positive configuration values are coerced rather than rejected, so a
/// bad budget degrades to aggressive truncation instead of failing a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptBudget {
    max_input_tokens: usize,
    reserved_output_tokens: usize,
}

impl Default for PromptBudget {
    fn default() -> Self {
        Self {
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            reserved_output_tokens: DEFAULT_RESERVED_OUTPUT_TOKENS,
        }
    }
}

impl PromptBudget {
    /// Build from raw (possibly negative) configuration values.
    pub fn new(max_input_tokens: i64, reserved_output_tokens: i64) -> Self {
        Self {
            max_input_tokens: max_input_tokens.max(0) as usize,
            reserved_output_tokens: reserved_output_tokens.max(0) as usize,
        }
    }

    /// Build from optional values, falling back to defaults for missing ones.
    pub fn from_options(max_input_tokens: Option<i64>, reserved_output_tokens: Option<i64>) -> Self {
        Self::new(
            max_input_tokens.unwrap_or(DEFAULT_MAX_INPUT_TOKENS as i64),
            reserved_output_tokens.unwrap_or(DEFAULT_RESERVED_OUTPUT_TOKENS as i64),
        )
    }

    pub fn max_input_tokens(&self) -> usize {
        self.max_input_tokens
    }

    pub fn reserved_output_tokens(&self) -> usize {
        self.reserved_output_tokens
    }

    /// `max(1, max_input − reserved_output)`.
    pub fn content_budget_tokens(&self) -> usize {
        self.max_input_tokens
            .saturating_sub(self.reserved_output_tokens)
            .max(1)
    }

    /// Same window with `tokens` more held back, e.g. for fixed prompt framing.
    pub fn reserve(&self, tokens: usize) -> Self {
        Self {
            max_input_tokens: self.max_input_tokens,
            reserved_output_tokens: self.reserved_output_tokens.saturating_add(tokens),
        }
    }

    /// `numerator / denominator` of the content budget, never below 1.
    pub fn share(&self, numerator: usize, denominator: usize) -> usize {
        if denominator == 0 {
            return self.content_budget_tokens();
        }
        (self.content_budget_tokens() * numerator / denominator).max(1)
    }
}
