//! Capability contracts: the only seams between the deliberation core and
//! the outside world (model backends, similarity memory, analyst stages).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, MemoryError, StageError};
use crate::state::{DeliberationState, ReportKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Which pipeline step issued a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPurpose {
    Analyst(ReportKind),
    Bull,
    Bear,
    InvestmentJudge,
    Trader,
    Risky,
    Safe,
    Neutral,
    RiskJudge,
    Signal,
}

impl CallPurpose {
    pub fn is_investment_debate(self) -> bool {
        matches!(self, Self::Bull | Self::Bear)
    }

    pub fn is_risk_debate(self) -> bool {
        matches!(self, Self::Risky | Self::Safe | Self::Neutral)
    }
}

impl std::fmt::Display for CallPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analyst(kind) => write!(f, "{kind}_analyst"),
            Self::Bull => write!(f, "bull"),
            Self::Bear => write!(f, "bear"),
            Self::InvestmentJudge => write!(f, "investment_judge"),
            Self::Trader => write!(f, "trader"),
            Self::Risky => write!(f, "risky"),
            Self::Safe => write!(f, "safe"),
            Self::Neutral => write!(f, "neutral"),
            Self::RiskJudge => write!(f, "risk_judge"),
            Self::Signal => write!(f, "signal"),
        }
    }
}

/// An ordered chat request tagged with its purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub purpose: CallPurpose,
    pub messages: Vec<ChatMessage>,
}

impl GenerationRequest {
    pub fn new(purpose: CallPurpose, messages: Vec<ChatMessage>) -> Self {
        Self { purpose, messages }
    }

    /// Concatenated message text, for token accounting in logs.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text generation backend. Retries, backoff and timeouts live behind this.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// A past situation and the lesson recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMatch {
    pub matched_situation: String,
    pub recommendation: String,
    pub similarity_score: f64,
}

/// Similarity store of past situations. Results are most-similar first and
/// an empty result is valid.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SituationMemory: Send + Sync {
    async fn similar(&self, situation: &str, k: usize) -> Result<Vec<MemoryMatch>, MemoryError>;

    async fn record(&self, situation: &str, recommendation: &str) -> Result<(), MemoryError>;
}

/// Produces one analyst report from the current state.
#[async_trait]
pub trait ReportProducer: Send + Sync {
    fn kind(&self) -> ReportKind;

    async fn produce(&self, state: &DeliberationState) -> Result<String, StageError>;
}

/// Recommendations joined by blank lines, in match order.
pub fn join_recommendations(matches: &[MemoryMatch]) -> String {
    matches
        .iter()
        .map(|m| m.recommendation.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purpose_classification() {
        assert!(CallPurpose::Bull.is_investment_debate());
        assert!(CallPurpose::Neutral.is_risk_debate());
        assert!(!CallPurpose::RiskJudge.is_risk_debate());
        assert_eq!(CallPurpose::Analyst(ReportKind::News).to_string(), "news_analyst");
    }

    #[test]
    fn test_request_text() {
        let req = GenerationRequest::new(
            CallPurpose::Trader,
            vec![ChatMessage::system("sys"), ChatMessage::user("hello")],
        );
        assert_eq!(req.text(), "sys\nhello");
    }

    #[test]
    fn test_join_recommendations() {
        let matches = vec![
            MemoryMatch {
                matched_situation: "a".into(),
                recommendation: "cut size".into(),
                similarity_score: 0.9,
            },
            MemoryMatch {
                matched_situation: "b".into(),
                recommendation: "wait for confirmation".into(),
                similarity_score: 0.4,
            },
        ];
        assert_eq!(join_recommendations(&matches), "cut size\n\nwait for confirmation");
        assert_eq!(join_recommendations(&[]), "");
    }

    #[tokio::test]
    async fn test_mock_generator() {
        let mut gen = MockGenerator::new();
        gen.expect_generate()
            .withf(|req| req.purpose == CallPurpose::Signal)
            .times(1)
            .returning(|_| Ok("HOLD".into()));
        let out = gen
            .generate(GenerationRequest::new(CallPurpose::Signal, vec![]))
            .await
            .unwrap();
        assert_eq!(out, "HOLD");
    }
}
