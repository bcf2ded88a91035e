//! Analyst stages: raw data feeds and the generative report producer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use deliberation::{
    CallPurpose, ChatMessage, DeliberationState, GenerationRequest, Generator, PromptBudget, ReportKind,
    ReportProducer, StageError, Truncator,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of raw analyst material for one report kind.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataFeed: Send + Sync {
    async fn fetch(&self, kind: ReportKind, symbol: &str, date: NaiveDate) -> Result<String, FeedError>;
}

fn no_data(kind: ReportKind, symbol: &str, date: NaiveDate) -> String {
    format!("No {kind} data available for {symbol} as of {date}.")
}

/// Feed with no data at all; every analyst works from its own knowledge.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyFeed;

#[async_trait]
impl DataFeed for EmptyFeed {
    async fn fetch(&self, kind: ReportKind, symbol: &str, date: NaiveDate) -> Result<String, FeedError> {
        Ok(no_data(kind, symbol, date))
    }
}

/// Reads `<root>/<symbol>/<kind>-<date>.md`, then `<kind>.md`, then `<kind>.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryFeed {
    root: PathBuf,
}

impl DirectoryFeed {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidates(&self, kind: ReportKind, symbol: &str, date: NaiveDate) -> Vec<PathBuf> {
        // Pair symbols like SOL/USDT must not escape the root.
        let dir: String = symbol
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '-' })
            .collect();
        let base = self.root.join(dir);
        vec![
            base.join(format!("{kind}-{date}.md")),
            base.join(format!("{kind}.md")),
            base.join(format!("{kind}.txt")),
        ]
    }
}

#[async_trait]
impl DataFeed for DirectoryFeed {
    async fn fetch(&self, kind: ReportKind, symbol: &str, date: NaiveDate) -> Result<String, FeedError> {
        for path in self.candidates(kind, symbol, date) {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    debug!(path = %path.display(), bytes = content.len(), "feed file loaded");
                    return Ok(content);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(FeedError::Io { path, source }),
            }
        }
        Ok(no_data(kind, symbol, date))
    }
}

fn analyst_brief(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Market => {
            "You are a market analyst. Study price action, volume and technical indicators \
             (moving averages, MACD, RSI, Bollinger bands, ATR) and describe the trend, \
             momentum and key levels in detail."
        }
        ReportKind::Sentiment => {
            "You are a social media and sentiment analyst. Summarise what people are saying, \
             how sentiment has shifted day by day and what that implies for traders."
        }
        ReportKind::News => {
            "You are a news researcher. Summarise recent news and macroeconomic developments \
             relevant to trading, and explain their likely market impact."
        }
        ReportKind::Fundamentals => {
            "You are a fundamentals researcher. Assess the financial health, valuation and \
             structural strengths and weaknesses relevant to an investment decision."
        }
    }
}

/// Writes one report with a single generation call over feed data.
pub struct GenerativeAnalyst {
    kind: ReportKind,
    generator: Arc<dyn Generator>,
    feed: Arc<dyn DataFeed>,
    budget: PromptBudget,
    truncator: Truncator,
}

impl GenerativeAnalyst {
    pub fn new(
        kind: ReportKind,
        generator: Arc<dyn Generator>,
        feed: Arc<dyn DataFeed>,
        budget: PromptBudget,
    ) -> Self {
        Self {
            kind,
            generator,
            feed,
            budget,
            truncator: Truncator::heuristic(),
        }
    }

    pub fn with_truncator(mut self, truncator: Truncator) -> Self {
        self.truncator = truncator;
        self
    }

    /// One analyst per report kind, sharing a generator and feed.
    pub fn full_team(
        generator: Arc<dyn Generator>,
        feed: Arc<dyn DataFeed>,
        budget: PromptBudget,
        truncator: &Truncator,
    ) -> Vec<Arc<dyn ReportProducer>> {
        ReportKind::ALL
            .into_iter()
            .map(|kind| {
                Arc::new(
                    Self::new(kind, Arc::clone(&generator), Arc::clone(&feed), budget)
                        .with_truncator(truncator.clone()),
                ) as Arc<dyn ReportProducer>
            })
            .collect()
    }
}

#[async_trait]
impl ReportProducer for GenerativeAnalyst {
    fn kind(&self) -> ReportKind {
        self.kind
    }

    async fn produce(&self, state: &DeliberationState) -> Result<String, StageError> {
        let symbol = state.asset_symbol();
        let date = state.analysis_date();
        let profile = state.asset_type().profile();

        let raw = self
            .feed
            .fetch(self.kind, symbol, date)
            .await
            .map_err(|e| StageError::DataFeed(e.to_string()))?;
        let raw = self.truncator.truncate_middle(&raw, self.budget.share(7, 10));

        let mut system = analyst_brief(self.kind).to_string();
        let guidance = profile.guidance(self.kind.prompt_role());
        if !guidance.is_empty() {
            system.push_str("\n\n");
            system.push_str(guidance);
        }
        let user = format!(
            "Raw data for {subject} as of {date}:\n\n{raw}\n\n\
             Write a detailed {kind} report for traders, ending with a Markdown table that \
             organises the key points.",
            subject = profile.describe(symbol),
            kind = self.kind,
        );

        info!(analyst = %self.kind, symbol, "analyst generating report");
        let report = self
            .generator
            .generate(GenerationRequest::new(
                CallPurpose::Analyst(self.kind),
                vec![ChatMessage::system(system), ChatMessage::user(user)],
            ))
            .await?;

        let report = report.trim();
        if report.is_empty() {
            return Err(StageError::EmptyReport(self.kind));
        }
        Ok(report.to_string())
    }
}
