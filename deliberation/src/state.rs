//! Deliberation state: the record threaded through every pipeline stage.
//!
//! Updates are functional: each stage receives a snapshot and returns a new
//! one, so a retried stage can never observe its own partial writes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::asset::{AssetType, PromptRole};
use crate::error::DeliberationError;

/// Kind of analyst report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Market,
    Sentiment,
    News,
    Fundamentals,
}

impl ReportKind {
    /// Every kind, in pipeline order.
    pub const ALL: [ReportKind; 4] = [Self::Market, Self::Sentiment, Self::News, Self::Fundamentals];

    /// Analyst prompt role for this report.
    pub fn prompt_role(self) -> PromptRole {
        match self {
            Self::Market => PromptRole::MarketAnalyst,
            Self::Sentiment => PromptRole::SentimentAnalyst,
            Self::News => PromptRole::NewsAnalyst,
            Self::Fundamentals => PromptRole::FundamentalsAnalyst,
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Sentiment => write!(f, "sentiment"),
            Self::News => write!(f, "news"),
            Self::Fundamentals => write!(f, "fundamentals"),
        }
    }
}

/// The four analyst reports; each written exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalystReports {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    market: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sentiment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    news: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fundamentals: Option<String>,
}

impl AnalystReports {
    fn slot(&self, kind: ReportKind) -> &Option<String> {
        match kind {
            ReportKind::Market => &self.market,
            ReportKind::Sentiment => &self.sentiment,
            ReportKind::News => &self.news,
            ReportKind::Fundamentals => &self.fundamentals,
        }
    }

    fn slot_mut(&mut self, kind: ReportKind) -> &mut Option<String> {
        match kind {
            ReportKind::Market => &mut self.market,
            ReportKind::Sentiment => &mut self.sentiment,
            ReportKind::News => &mut self.news,
            ReportKind::Fundamentals => &mut self.fundamentals,
        }
    }

    /// The report for `kind`, if produced.
    pub fn get(&self, kind: ReportKind) -> Option<&str> {
        self.slot(kind).as_deref()
    }

    /// The report for `kind`, or `""` if not produced yet.
    pub fn text(&self, kind: ReportKind) -> &str {
        self.get(kind).unwrap_or("")
    }

    /// New reports with `kind` filled in. Fails if `kind` was already written.
    pub fn with_report(&self, kind: ReportKind, text: impl Into<String>) -> Result<Self, DeliberationError> {
        if self.slot(kind).is_some() {
            return Err(DeliberationError::AlreadySet(match kind {
                ReportKind::Market => "market report",
                ReportKind::Sentiment => "sentiment report",
                ReportKind::News => "news report",
                ReportKind::Fundamentals => "fundamentals report",
            }));
        }
        let mut next = self.clone();
        *next.slot_mut(kind) = Some(text.into());
        Ok(next)
    }

    /// Kinds not yet produced.
    pub fn missing(&self) -> Vec<ReportKind> {
        ReportKind::ALL
            .into_iter()
            .filter(|k| self.slot(*k).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Situation summary used for memory lookups: all reports, blank-line separated.
    pub fn situation(&self) -> String {
        ReportKind::ALL
            .iter()
            .map(|k| self.text(*k))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Append `argument` to a history, newline first.
fn append_line(history: &str, argument: &str) -> String {
    format!("{history}\n{argument}")
}

/// Side in the investment debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentSpeaker {
    Bull,
    Bear,
}

impl InvestmentSpeaker {
    /// Label prefixed to every argument.
    pub fn label(self) -> &'static str {
        match self {
            Self::Bull => "Bull Analyst",
            Self::Bear => "Bear Analyst",
        }
    }
}

impl std::fmt::Display for InvestmentSpeaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bull => write!(f, "bull"),
            Self::Bear => write!(f, "bear"),
        }
    }
}

/// Bull/bear debate history.
///
/// `history` is always the interleaving, in call order, of every argument
/// appended by either side; `count` grows by exactly one per argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentDebateState {
    pub history: String,
    pub bull_history: String,
    pub bear_history: String,
    /// Latest argument from whichever side spoke last.
    pub current_response: String,
    pub count: u32,
}

impl InvestmentDebateState {
    /// Who speaks next. Bull always opens and sides strictly alternate.
    pub fn next_speaker(&self) -> InvestmentSpeaker {
        if self.count % 2 == 0 {
            InvestmentSpeaker::Bull
        } else {
            InvestmentSpeaker::Bear
        }
    }

    /// New state with a labelled argument from `speaker` appended.
    pub fn append(&self, speaker: InvestmentSpeaker, argument: &str) -> Self {
        let (bull_history, bear_history) = match speaker {
            InvestmentSpeaker::Bull => (append_line(&self.bull_history, argument), self.bear_history.clone()),
            InvestmentSpeaker::Bear => (self.bull_history.clone(), append_line(&self.bear_history, argument)),
        };
        Self {
            history: append_line(&self.history, argument),
            bull_history,
            bear_history,
            current_response: argument.to_string(),
            count: self.count + 1,
        }
    }
}

/// Side in the risk debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSpeaker {
    Risky,
    Safe,
    Neutral,
}

impl RiskSpeaker {
    pub fn label(self) -> &'static str {
        match self {
            Self::Risky => "Risky Analyst",
            Self::Safe => "Safe Analyst",
            Self::Neutral => "Neutral Analyst",
        }
    }

    /// Rotation order: risky → safe → neutral → risky.
    pub fn next(self) -> Self {
        match self {
            Self::Risky => Self::Safe,
            Self::Safe => Self::Neutral,
            Self::Neutral => Self::Risky,
        }
    }

    pub fn prompt_role(self) -> PromptRole {
        match self {
            Self::Risky => PromptRole::Risky,
            Self::Safe => PromptRole::Safe,
            Self::Neutral => PromptRole::Neutral,
        }
    }
}

impl std::fmt::Display for RiskSpeaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Risky => write!(f, "risky"),
            Self::Safe => write!(f, "safe"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Three-sided risk debate history.
///
/// `latest_speaker` always names the side whose round ran most recently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDebateState {
    pub history: String,
    pub risky_history: String,
    pub safe_history: String,
    pub neutral_history: String,
    pub latest_speaker: Option<RiskSpeaker>,
    pub current_risky_response: String,
    pub current_safe_response: String,
    pub current_neutral_response: String,
    pub count: u32,
}

impl RiskDebateState {
    /// Who speaks next; risky opens.
    pub fn next_speaker(&self) -> RiskSpeaker {
        self.latest_speaker.map_or(RiskSpeaker::Risky, RiskSpeaker::next)
    }

    /// Latest argument from `speaker`, or `""`.
    pub fn latest_response(&self, speaker: RiskSpeaker) -> &str {
        match speaker {
            RiskSpeaker::Risky => &self.current_risky_response,
            RiskSpeaker::Safe => &self.current_safe_response,
            RiskSpeaker::Neutral => &self.current_neutral_response,
        }
    }

    /// New state with a labelled argument from `speaker` appended.
    pub fn append(&self, speaker: RiskSpeaker, argument: &str) -> Self {
        let mut next = self.clone();
        next.history = append_line(&self.history, argument);
        match speaker {
            RiskSpeaker::Risky => {
                next.risky_history = append_line(&self.risky_history, argument);
                next.current_risky_response = argument.to_string();
            }
            RiskSpeaker::Safe => {
                next.safe_history = append_line(&self.safe_history, argument);
                next.current_safe_response = argument.to_string();
            }
            RiskSpeaker::Neutral => {
                next.neutral_history = append_line(&self.neutral_history, argument);
                next.current_neutral_response = argument.to_string();
            }
        }
        next.latest_speaker = Some(speaker);
        next.count = self.count + 1;
        next
    }
}

/// Shared record for one deliberation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliberationState {
    asset_symbol: String,
    analysis_date: NaiveDate,
    asset_type: AssetType,
    analyst_reports: AnalystReports,
    investment_debate_state: InvestmentDebateState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    investment_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trader_investment_plan: Option<String>,
    risk_debate_state: RiskDebateState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_trade_decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_signal: Option<String>,
}

/// Write a write-once field, rejecting a second write.
fn set_once(slot: &Option<String>, field: &'static str, value: String) -> Result<Option<String>, DeliberationError> {
    if slot.is_some() {
        return Err(DeliberationError::AlreadySet(field));
    }
    Ok(Some(value))
}

impl DeliberationState {
    /// Fresh state for one run.
    pub fn new(asset_symbol: impl Into<String>, analysis_date: NaiveDate, asset_type: AssetType) -> Self {
        Self {
            asset_symbol: asset_symbol.into(),
            analysis_date,
            asset_type,
            analyst_reports: AnalystReports::default(),
            investment_debate_state: InvestmentDebateState::default(),
            investment_plan: None,
            trader_investment_plan: None,
            risk_debate_state: RiskDebateState::default(),
            final_trade_decision: None,
            final_signal: None,
        }
    }

    pub fn asset_symbol(&self) -> &str {
        &self.asset_symbol
    }

    pub fn analysis_date(&self) -> NaiveDate {
        self.analysis_date
    }

    pub fn asset_type(&self) -> AssetType {
        self.asset_type
    }

    pub fn analyst_reports(&self) -> &AnalystReports {
        &self.analyst_reports
    }

    pub fn investment_debate_state(&self) -> &InvestmentDebateState {
        &self.investment_debate_state
    }

    pub fn investment_plan(&self) -> Option<&str> {
        self.investment_plan.as_deref()
    }

    pub fn trader_investment_plan(&self) -> Option<&str> {
        self.trader_investment_plan.as_deref()
    }

    pub fn risk_debate_state(&self) -> &RiskDebateState {
        &self.risk_debate_state
    }

    pub fn final_trade_decision(&self) -> Option<&str> {
        self.final_trade_decision.as_deref()
    }

    pub fn final_signal(&self) -> Option<&str> {
        self.final_signal.as_deref()
    }

    pub fn with_report(&self, kind: ReportKind, text: impl Into<String>) -> Result<Self, DeliberationError> {
        let mut next = self.clone();
        next.analyst_reports = self.analyst_reports.with_report(kind, text)?;
        Ok(next)
    }

    pub fn with_investment_debate(&self, debate: InvestmentDebateState) -> Self {
        let mut next = self.clone();
        next.investment_debate_state = debate;
        next
    }

    pub fn with_risk_debate(&self, debate: RiskDebateState) -> Self {
        let mut next = self.clone();
        next.risk_debate_state = debate;
        next
    }

    pub fn with_investment_plan(&self, plan: impl Into<String>) -> Result<Self, DeliberationError> {
        let mut next = self.clone();
        next.investment_plan = set_once(&self.investment_plan, "investment_plan", plan.into())?;
        Ok(next)
    }

    pub fn with_trader_plan(&self, plan: impl Into<String>) -> Result<Self, DeliberationError> {
        let mut next = self.clone();
        next.trader_investment_plan =
            set_once(&self.trader_investment_plan, "trader_investment_plan", plan.into())?;
        Ok(next)
    }

    pub fn with_final_trade_decision(&self, decision: impl Into<String>) -> Result<Self, DeliberationError> {
        let mut next = self.clone();
        next.final_trade_decision =
            set_once(&self.final_trade_decision, "final_trade_decision", decision.into())?;
        Ok(next)
    }

    pub fn with_final_signal(&self, signal: impl Into<String>) -> Result<Self, DeliberationError> {
        let mut next = self.clone();
        next.final_signal = set_once(&self.final_signal, "final_signal", signal.into())?;
        Ok(next)
    }
}
