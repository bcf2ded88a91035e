//! Deliberation tunables: debate lengths, prompt window and memory lookups.

use serde::{Deserialize, Serialize};

use crate::budget::prompt_budget::{DEFAULT_MAX_INPUT_TOKENS, DEFAULT_RESERVED_OUTPUT_TOKENS};
use crate::budget::PromptBudget;
use crate::error::DeliberationError;

/// Tunables for a deliberation run.
///
/// Token fields are signed so that nonsense values from a config file can be
/// coerced by [`PromptBudget`] instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliberationConfig {
    /// Bull/bear exchanges; the debate runs `2 ×` this many calls.
    pub max_debate_rounds: u32,
    /// Risky/safe/neutral rotations; the debate runs `3 ×` this many calls.
    pub max_risk_discuss_rounds: u32,
    pub llm_max_input_tokens: i64,
    pub llm_reserved_output_tokens: i64,
    /// Past situations fetched per memory lookup.
    pub memory_matches: usize,
    /// Cap applied to situation text before it is indexed or queried.
    pub embedding_max_input_tokens: i64,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            llm_max_input_tokens: DEFAULT_MAX_INPUT_TOKENS as i64,
            llm_reserved_output_tokens: DEFAULT_RESERVED_OUTPUT_TOKENS as i64,
            memory_matches: 2,
            embedding_max_input_tokens: 6_000,
        }
    }
}

impl DeliberationConfig {
    pub fn prompt_budget(&self) -> PromptBudget {
        PromptBudget::new(self.llm_max_input_tokens, self.llm_reserved_output_tokens)
    }

    /// Embedding cap, floored at one token.
    pub fn embedding_budget(&self) -> usize {
        self.embedding_max_input_tokens.max(1) as usize
    }

    /// Total bull + bear calls before the investment judge runs.
    pub fn investment_round_limit(&self) -> u32 {
        self.max_debate_rounds.saturating_mul(2)
    }

    /// Total risky + safe + neutral calls before the risk judge runs.
    pub fn risk_round_limit(&self) -> u32 {
        self.max_risk_discuss_rounds.saturating_mul(3)
    }

    /// Round counts must be positive and their call totals must fit a `u32`.
    /// Token fields are never rejected.
    pub fn validate(&self) -> Result<(), DeliberationError> {
        if self.max_debate_rounds == 0 {
            return Err(DeliberationError::Configuration(
                "max_debate_rounds must be at least 1".into(),
            ));
        }
        if self.max_risk_discuss_rounds == 0 {
            return Err(DeliberationError::Configuration(
                "max_risk_discuss_rounds must be at least 1".into(),
            ));
        }
        if self.max_debate_rounds.checked_mul(2).is_none() {
            return Err(DeliberationError::Configuration(format!(
                "max_debate_rounds {} is too large",
                self.max_debate_rounds
            )));
        }
        if self.max_risk_discuss_rounds.checked_mul(3).is_none() {
            return Err(DeliberationError::Configuration(format!(
                "max_risk_discuss_rounds {} is too large",
                self.max_risk_discuss_rounds
            )));
        }
        Ok(())
    }
}
