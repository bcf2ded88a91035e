//! Trading Deliberation Core
//!
//! This library provides:
//! - Prompt context budgeting: token estimation, middle/tail truncation and
//!   shared-budget clamping of several prompt blocks
//! - A bull/bear investment debate and a risky/safe/neutral risk debate
//! - Judge, trader and signal-extraction stages
//! - A stage machine driving one run from analyst reports to a BUY/SELL/HOLD signal
//!
//! Model backends, similarity memory and analyst data all sit behind the
//! async traits in [`capability`].
//!
//! # Usage
//!
//! ```ignore
//! let pipeline = DeliberationPipeline::builder()
//!     .quick(quick_generator)
//!     .deep(deep_generator)
//!     .analyst(market_analyst)
//!     // ... one analyst per report kind
//!     .build()?;
//! let outcome = pipeline.run("BTC", date, classify_symbol("BTC")).await?;
//! println!("{}", outcome.signal_text);
//! ```

pub mod asset;
pub mod budget;
pub mod capability;
pub mod config;
pub mod debate;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod risk;
pub mod stages;
pub mod state;

pub use asset::{classify_symbol, AssetProfile, AssetType, PromptRole};
pub use budget::{ClampedBlocks, EstimatorMode, PromptBudget, Tokenizer, Truncator};
pub use capability::{
    CallPurpose, ChatMessage, ChatRole, GenerationRequest, Generator, MemoryMatch, ReportProducer,
    SituationMemory,
};
pub use config::DeliberationConfig;
pub use debate::{bear_round, bull_round, RoundContext};
pub use error::{DeliberationError, GenerationError, MemoryError, StageError};
pub use memory::{InMemorySituationStore, SituationRecord};
pub use pipeline::{
    DeliberationPipeline, DeliberationPipelineBuilder, IllegalTransition, PipelineStage, RunOutcome,
    StageMachine, StageTransition,
};
pub use risk::{neutral_round, risky_round, safe_round};
pub use stages::{extract_signal, investment_judge, risk_judge, trader_stage, Signal};
pub use state::{
    AnalystReports, DeliberationState, InvestmentDebateState, InvestmentSpeaker, ReportKind,
    RiskDebateState, RiskSpeaker,
};
