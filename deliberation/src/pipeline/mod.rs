//! Deliberation pipeline: drives one run through every stage.
//!
//! The run is a single sequential chain of awaits. The only state shared
//! between runs is the memory capability, which handles its own locking.

pub mod stage_machine;

pub use stage_machine::{IllegalTransition, PipelineStage, StageMachine, StageTransition};

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::asset::AssetType;
use crate::budget::Truncator;
use crate::capability::{Generator, ReportProducer, SituationMemory};
use crate::config::DeliberationConfig;
use crate::debate::{bear_round, bull_round, RoundContext};
use crate::error::DeliberationError;
use crate::memory::InMemorySituationStore;
use crate::risk::{neutral_round, risky_round, safe_round};
use crate::stages::{extract_signal, investment_judge, risk_judge, trader_stage, Signal};
use crate::state::{DeliberationState, InvestmentSpeaker, RiskSpeaker};

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Raw reply of the signal extraction call, trimmed.
    pub signal_text: String,
    /// Parsed signal; `None` if the reply held no BUY/SELL/HOLD.
    pub signal: Option<Signal>,
    pub state: DeliberationState,
    pub transitions: Vec<StageTransition>,
}

pub struct DeliberationPipeline {
    quick: Arc<dyn Generator>,
    deep: Arc<dyn Generator>,
    memory: Arc<dyn SituationMemory>,
    analysts: Vec<Arc<dyn ReportProducer>>,
    config: DeliberationConfig,
    truncator: Truncator,
}

impl std::fmt::Debug for DeliberationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliberationPipeline")
            .field("analysts", &self.analysts.iter().map(|a| a.kind()).collect::<Vec<_>>())
            .field("config", &self.config)
            .field("truncator", &self.truncator)
            .finish()
    }
}

#[derive(Default)]
pub struct DeliberationPipelineBuilder {
    quick: Option<Arc<dyn Generator>>,
    deep: Option<Arc<dyn Generator>>,
    memory: Option<Arc<dyn SituationMemory>>,
    analysts: Vec<Arc<dyn ReportProducer>>,
    config: DeliberationConfig,
    truncator: Option<Truncator>,
}

impl DeliberationPipelineBuilder {
    /// Generator for analysts, debaters, the trader and signal extraction.
    pub fn quick(mut self, generator: Arc<dyn Generator>) -> Self {
        self.quick = Some(generator);
        self
    }

    /// Generator for the two judges.
    pub fn deep(mut self, generator: Arc<dyn Generator>) -> Self {
        self.deep = Some(generator);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn SituationMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Register an analyst. Analysts run in registration order.
    pub fn analyst(mut self, producer: Arc<dyn ReportProducer>) -> Self {
        self.analysts.push(producer);
        self
    }

    pub fn config(mut self, config: DeliberationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn truncator(mut self, truncator: Truncator) -> Self {
        self.truncator = Some(truncator);
        self
    }

    /// A missing quick or deep generator falls back to the other one; a
    /// missing memory becomes an empty in-process store.
    pub fn build(self) -> Result<DeliberationPipeline, DeliberationError> {
        self.config.validate()?;
        let (quick, deep) = match (self.quick, self.deep) {
            (Some(q), Some(d)) => (q, d),
            (Some(q), None) => (Arc::clone(&q), q),
            (None, Some(d)) => (Arc::clone(&d), d),
            (None, None) => {
                return Err(DeliberationError::Configuration(
                    "at least one generator is required".into(),
                ))
            }
        };
        let truncator = self.truncator.unwrap_or_default();
        let memory = self.memory.unwrap_or_else(|| {
            Arc::new(InMemorySituationStore::with_truncator(
                truncator.clone(),
                self.config.embedding_budget(),
            )) as Arc<dyn SituationMemory>
        });
        Ok(DeliberationPipeline {
            quick,
            deep,
            memory,
            analysts: self.analysts,
            config: self.config,
            truncator,
        })
    }
}

impl DeliberationPipeline {
    pub fn builder() -> DeliberationPipelineBuilder {
        DeliberationPipelineBuilder::default()
    }

    pub fn config(&self) -> &DeliberationConfig {
        &self.config
    }

    pub fn memory(&self) -> &Arc<dyn SituationMemory> {
        &self.memory
    }

    fn context<'a>(&'a self, generator: &'a dyn Generator) -> RoundContext<'a> {
        RoundContext {
            generator,
            memory: self.memory.as_ref(),
            truncator: &self.truncator,
            budget: self.config.prompt_budget(),
            memory_matches: self.config.memory_matches,
        }
    }

    /// Run a full deliberation for one asset on one date.
    ///
    /// On failure the stage machine moves to `Failed`, no signal is produced
    /// and the originating error is returned.
    pub async fn run(
        &self,
        symbol: &str,
        date: NaiveDate,
        asset_type: AssetType,
    ) -> Result<RunOutcome, DeliberationError> {
        let span = info_span!("deliberation", symbol = %symbol, date = %date, asset_type = %asset_type);
        async {
            let mut machine = StageMachine::new();
            let state = DeliberationState::new(symbol, date, asset_type);
            match self.drive(&mut machine, state).await {
                Ok(state) => {
                    let signal_text = state.final_signal().unwrap_or_default().to_string();
                    let signal = Signal::parse(&signal_text);
                    if signal.is_none() {
                        warn!(reply = %signal_text, "signal reply holds no BUY/SELL/HOLD");
                    }
                    info!(signal = %signal_text, "deliberation complete");
                    Ok(RunOutcome {
                        signal_text,
                        signal,
                        state,
                        transitions: machine.into_transitions(),
                    })
                }
                Err(err) => {
                    let stage = machine.current();
                    if let Err(illegal) = machine.fail(&err.to_string()) {
                        warn!(error = %illegal, "could not record failure");
                    }
                    warn!(stage = %stage, error = %err, "deliberation failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        machine: &mut StageMachine,
        state: DeliberationState,
    ) -> Result<DeliberationState, DeliberationError> {
        let state = self.analysis(state).await?;
        machine.advance(PipelineStage::InvestmentDebate, None)?;

        let state = self.investment_debate(state).await?;
        machine.advance(PipelineStage::Trading, None)?;

        let plan = trader_stage(&self.context(self.quick.as_ref()), &state).await?;
        let state = state.with_trader_plan(plan)?;
        machine.advance(PipelineStage::RiskDebate, None)?;

        let state = self.risk_debate(state).await?;
        machine.advance(PipelineStage::SignalExtraction, None)?;

        let reply = extract_signal(&self.context(self.quick.as_ref()), &state).await?;
        let state = state.with_final_signal(reply.trim())?;
        machine.advance(PipelineStage::Done, None)?;
        Ok(state)
    }

    async fn analysis(&self, mut state: DeliberationState) -> Result<DeliberationState, DeliberationError> {
        for analyst in &self.analysts {
            let kind = analyst.kind();
            info!(analyst = %kind, "producing report");
            let report = analyst
                .produce(&state)
                .await
                .map_err(|source| DeliberationError::Stage { kind, source })?;
            state = state.with_report(kind, report)?;
        }
        let missing = state.analyst_reports().missing();
        if !missing.is_empty() {
            warn!(?missing, "analysis incomplete");
            return Err(DeliberationError::MissingInput("analyst reports"));
        }
        Ok(state)
    }

    async fn investment_debate(&self, mut state: DeliberationState) -> Result<DeliberationState, DeliberationError> {
        let ctx = self.context(self.quick.as_ref());
        let limit = self.config.investment_round_limit();
        while state.investment_debate_state().count < limit {
            let debate = match state.investment_debate_state().next_speaker() {
                InvestmentSpeaker::Bull => bull_round(&ctx, &state).await?,
                InvestmentSpeaker::Bear => bear_round(&ctx, &state).await?,
            };
            state = state.with_investment_debate(debate);
        }
        let plan = investment_judge(&ctx.with_generator(self.deep.as_ref()), &state).await?;
        state.with_investment_plan(plan)
    }

    async fn risk_debate(&self, mut state: DeliberationState) -> Result<DeliberationState, DeliberationError> {
        let ctx = self.context(self.quick.as_ref());
        let limit = self.config.risk_round_limit();
        while state.risk_debate_state().count < limit {
            let debate = match state.risk_debate_state().next_speaker() {
                RiskSpeaker::Risky => risky_round(&ctx, &state).await?,
                RiskSpeaker::Safe => safe_round(&ctx, &state).await?,
                RiskSpeaker::Neutral => neutral_round(&ctx, &state).await?,
            };
            state = state.with_risk_debate(debate);
        }
        let decision = risk_judge(&ctx.with_generator(self.deep.as_ref()), &state).await?;
        state.with_final_trade_decision(decision)
    }
}
