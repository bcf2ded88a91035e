//! Scripted pipeline integration test: drives full deliberation runs with
//! deterministic generators and analysts (no model calls).
//!
//! Covers: analysts ↔ investment debate ↔ trader ↔ risk debate ↔ signal
//! extraction, round accounting per call purpose, and failure handling.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use deliberation::{
    AssetType, CallPurpose, DeliberationConfig, DeliberationError, DeliberationPipeline,
    DeliberationState, GenerationError, GenerationRequest, Generator, InMemorySituationStore,
    PipelineStage, ReportKind, ReportProducer, RiskSpeaker, Signal, SituationMemory, StageError,
};

/// Generator that answers by purpose and records every call.
#[derive(Default)]
struct ScriptedGenerator {
    calls: Mutex<Vec<CallPurpose>>,
    fail_on: Option<CallPurpose>,
    signal_reply: Option<&'static str>,
}

impl ScriptedGenerator {
    fn failing_on(purpose: CallPurpose) -> Self {
        Self {
            fail_on: Some(purpose),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<CallPurpose> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(CallPurpose) -> bool) -> usize {
        self.calls().into_iter().filter(|p| pred(*p)).count()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(request.purpose);
        if self.fail_on == Some(request.purpose) {
            return Err(GenerationError::Inference(format!("{} backend down", request.purpose)));
        }
        Ok(match request.purpose {
            CallPurpose::Signal => self.signal_reply.unwrap_or("SELL").to_string(),
            CallPurpose::Trader => "FINAL TRANSACTION PROPOSAL: **SELL**".to_string(),
            other => format!("{other} argument"),
        })
    }
}

/// Shared-reference wrapper so a test can keep inspecting the generator.
struct Shared(Arc<ScriptedGenerator>);

#[async_trait]
impl Generator for Shared {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        self.0.generate(request).await
    }
}

struct StaticAnalyst {
    kind: ReportKind,
    fail: bool,
}

#[async_trait]
impl ReportProducer for StaticAnalyst {
    fn kind(&self) -> ReportKind {
        self.kind
    }

    async fn produce(&self, state: &DeliberationState) -> Result<String, StageError> {
        if self.fail {
            return Err(StageError::DataFeed("feed offline".into()));
        }
        Ok(format!("{} view on {}", self.kind, state.asset_symbol()))
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()
}

fn pipeline(
    generator: Arc<ScriptedGenerator>,
    config: DeliberationConfig,
    memory: Option<Arc<dyn SituationMemory>>,
) -> DeliberationPipeline {
    let mut builder = DeliberationPipeline::builder()
        .quick(Arc::new(Shared(generator)))
        .config(config);
    for kind in ReportKind::ALL {
        builder = builder.analyst(Arc::new(StaticAnalyst { kind, fail: false }));
    }
    if let Some(memory) = memory {
        builder = builder.memory(memory);
    }
    builder.build().unwrap()
}

// ── Happy path with one round each ─────────────────────────────────

#[tokio::test]
async fn test_single_round_call_accounting() {
    let gen = Arc::new(ScriptedGenerator::default());
    let outcome = pipeline(Arc::clone(&gen), DeliberationConfig::default(), None)
        .run("AAPL", date(), AssetType::Stock)
        .await
        .unwrap();

    assert_eq!(gen.count(CallPurpose::is_investment_debate), 2);
    assert_eq!(gen.count(CallPurpose::is_risk_debate), 3);
    assert_eq!(
        gen.calls(),
        vec![
            CallPurpose::Bull,
            CallPurpose::Bear,
            CallPurpose::InvestmentJudge,
            CallPurpose::Trader,
            CallPurpose::Risky,
            CallPurpose::Safe,
            CallPurpose::Neutral,
            CallPurpose::RiskJudge,
            CallPurpose::Signal,
        ]
    );

    assert_eq!(outcome.signal, Some(Signal::Sell));
    assert_eq!(outcome.signal_text, "SELL");
    let state = &outcome.state;
    assert_eq!(state.final_signal(), Some("SELL"));
    assert_eq!(state.investment_plan(), Some("investment_judge argument"));
    assert_eq!(state.final_trade_decision(), Some("risk_judge argument"));
    assert_eq!(state.risk_debate_state().latest_speaker, Some(RiskSpeaker::Neutral));
    assert!(state.analyst_reports().is_complete());
    assert_eq!(
        state.investment_debate_state().history,
        "\nBull Analyst: bull argument\nBear Analyst: bear argument"
    );

    let stages: Vec<PipelineStage> = outcome.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::InvestmentDebate,
            PipelineStage::Trading,
            PipelineStage::RiskDebate,
            PipelineStage::SignalExtraction,
            PipelineStage::Done,
        ]
    );
}

#[tokio::test]
async fn test_round_counts_scale_with_config() {
    for (debate_rounds, risk_rounds) in [(1, 2), (2, 1), (3, 3)] {
        let gen = Arc::new(ScriptedGenerator::default());
        let config = DeliberationConfig {
            max_debate_rounds: debate_rounds,
            max_risk_discuss_rounds: risk_rounds,
            ..Default::default()
        };
        let outcome = pipeline(Arc::clone(&gen), config, None)
            .run("BTC", date(), AssetType::Cryptocurrency)
            .await
            .unwrap();

        assert_eq!(gen.count(CallPurpose::is_investment_debate), 2 * debate_rounds as usize);
        assert_eq!(gen.count(CallPurpose::is_risk_debate), 3 * risk_rounds as usize);
        assert_eq!(outcome.state.investment_debate_state().count, 2 * debate_rounds);
        assert_eq!(outcome.state.risk_debate_state().count, 3 * risk_rounds);
        // Bull always opens and sides strictly alternate.
        let debate: Vec<CallPurpose> = gen
            .calls()
            .into_iter()
            .filter(|p| p.is_investment_debate())
            .collect();
        for (i, p) in debate.iter().enumerate() {
            let expected = if i % 2 == 0 { CallPurpose::Bull } else { CallPurpose::Bear };
            assert_eq!(*p, expected);
        }
    }
}

#[tokio::test]
async fn test_unparseable_signal_still_completes() {
    let gen = Arc::new(ScriptedGenerator {
        signal_reply: Some("  no clear call  "),
        ..Default::default()
    });
    let outcome = pipeline(gen, DeliberationConfig::default(), None)
        .run("MSFT", date(), AssetType::Stock)
        .await
        .unwrap();
    assert_eq!(outcome.signal, None);
    assert_eq!(outcome.signal_text, "no clear call");
}

// ── Failure handling ───────────────────────────────────────────────

#[tokio::test]
async fn test_generation_failure_aborts_without_signal() {
    for purpose in [CallPurpose::Bear, CallPurpose::Trader, CallPurpose::Safe, CallPurpose::Signal] {
        let gen = Arc::new(ScriptedGenerator::failing_on(purpose));
        let err = pipeline(Arc::clone(&gen), DeliberationConfig::default(), None)
            .run("AAPL", date(), AssetType::Stock)
            .await
            .unwrap_err();
        assert!(
            matches!(err, DeliberationError::Generation(GenerationError::Inference(_))),
            "purpose={purpose}: {err}"
        );
        // No call after the failing one.
        assert_eq!(gen.calls().last(), Some(&purpose));
    }
}

#[tokio::test]
async fn test_analyst_failure_reports_kind() {
    let gen = Arc::new(ScriptedGenerator::default());
    let pipeline = DeliberationPipeline::builder()
        .quick(Arc::new(Shared(Arc::clone(&gen))))
        .analyst(Arc::new(StaticAnalyst {
            kind: ReportKind::Market,
            fail: false,
        }))
        .analyst(Arc::new(StaticAnalyst {
            kind: ReportKind::News,
            fail: true,
        }))
        .build()
        .unwrap();
    let err = pipeline.run("AAPL", date(), AssetType::Stock).await.unwrap_err();
    assert!(matches!(
        err,
        DeliberationError::Stage {
            kind: ReportKind::News,
            source: StageError::DataFeed(_)
        }
    ));
    assert!(gen.calls().is_empty());
}

// ── Shared memory across runs ──────────────────────────────────────

#[tokio::test]
async fn test_concurrent_runs_share_memory() {
    let store = Arc::new(InMemorySituationStore::new(6_000));
    store
        .seed(vec![(
            "market view on AAPL".to_string(),
            "Do not fight the trend.".to_string(),
        )])
        .await;
    let memory: Arc<dyn SituationMemory> = store.clone();

    let mut handles = Vec::new();
    for symbol in ["AAPL", "MSFT", "NVDA"] {
        let memory = Arc::clone(&memory);
        handles.push(tokio::spawn(async move {
            let gen = Arc::new(ScriptedGenerator::default());
            pipeline(gen, DeliberationConfig::default(), Some(memory))
                .run(symbol, date(), AssetType::Stock)
                .await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.signal, Some(Signal::Sell));
    }

    memory
        .record("market view on AAPL, risk off", "Trim into strength.")
        .await
        .unwrap();
    assert_eq!(store.len().await, 2);
}
