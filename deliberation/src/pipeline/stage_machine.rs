//! Pipeline stage machine: explicit stages and legal transition guards.
//!
//! Every run starts at `Analysis` and ends at `Done` or `Failed`. The
//! transition log records each edge so a run can be audited afterwards.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage of a single deliberation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Producing the four analyst reports.
    Analysis,
    /// Bull/bear rounds, then the investment judge.
    InvestmentDebate,
    /// Trader drafting a transaction proposal.
    Trading,
    /// Risky/safe/neutral rounds, then the risk judge.
    RiskDebate,
    /// Reducing the final decision to BUY/SELL/HOLD.
    SignalExtraction,
    /// Signal produced (terminal).
    Done,
    /// A stage failed (terminal).
    Failed,
}

impl PipelineStage {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis => write!(f, "Analysis"),
            Self::InvestmentDebate => write!(f, "InvestmentDebate"),
            Self::Trading => write!(f, "Trading"),
            Self::RiskDebate => write!(f, "RiskDebate"),
            Self::SignalExtraction => write!(f, "SignalExtraction"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// ```text
/// Analysis → InvestmentDebate → Trading → RiskDebate → SignalExtraction → Done
/// any non-terminal → Failed
/// ```
fn is_legal_transition(from: PipelineStage, to: PipelineStage) -> bool {
    use PipelineStage::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Analysis, InvestmentDebate)
            | (InvestmentDebate, Trading)
            | (Trading, RiskDebate)
            | (RiskDebate, SignalExtraction)
            | (SignalExtraction, Done)
    )
}

/// One recorded stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    /// Stage being left.
    pub from: PipelineStage,
    /// Stage being entered.
    pub to: PipelineStage,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    /// Why the run moved, e.g. the error that failed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal stage transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: PipelineStage,
    pub to: PipelineStage,
}

/// Tracks the current stage and rejects edges outside the table.
#[derive(Debug)]
pub struct StageMachine {
    current: PipelineStage,
    created_at: Instant,
    transitions: Vec<StageTransition>,
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineStage::Analysis,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn advance(&mut self, to: PipelineStage, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::info!(from = %self.current, to = %to, "stage transition");
        self.transitions.push(StageTransition {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Move to `Failed`; legal from any non-terminal stage.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(PipelineStage::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<StageTransition> {
        self.transitions
    }
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}
