//! Bull/bear investment debate rounds.
//!
//! A round is one argument from one side: recall past lessons, fit the
//! context into the prompt budget, make a single generation call, and append
//! the labelled reply to a fresh copy of the debate state.

use tracing::{debug, info, warn};

use crate::asset::{AssetProfile, PromptRole};
use crate::budget::{PromptBudget, Truncator};
use crate::capability::{
    join_recommendations, CallPurpose, ChatMessage, GenerationRequest, Generator, SituationMemory,
};
use crate::error::DeliberationError;
use crate::state::{DeliberationState, InvestmentDebateState, InvestmentSpeaker, ReportKind};

/// Name of the past-lessons block inside clamped prompts.
pub(crate) const PAST_MEMORY_LABEL: &str = "Reflections from similar situations and lessons learned";

/// Everything a round or stage needs besides the state itself.
#[derive(Clone, Copy)]
pub struct RoundContext<'a> {
    pub generator: &'a dyn Generator,
    pub memory: &'a dyn SituationMemory,
    pub truncator: &'a Truncator,
    pub budget: PromptBudget,
    /// Past situations fetched per lookup.
    pub memory_matches: usize,
}

impl<'a> RoundContext<'a> {
    /// Same context, different generator (judges use the deep one).
    pub fn with_generator(self, generator: &'a dyn Generator) -> Self {
        Self { generator, ..self }
    }

    /// Recommendations from similar past situations, blank-line separated.
    pub(crate) async fn recall(&self, situation: &str) -> Result<String, DeliberationError> {
        let matches = self.memory.similar(situation, self.memory_matches).await?;
        if matches.is_empty() {
            warn!("no similar past situations in memory");
        }
        Ok(join_recommendations(&matches))
    }

    /// Budget left for variable content after the fixed text of `frame`.
    pub(crate) fn budget_after(&self, frame: &[ChatMessage]) -> PromptBudget {
        let fixed = frame
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.budget.reserve(self.truncator.estimate(&fixed))
    }

    /// Single generation call with token accounting.
    pub(crate) async fn call(
        &self,
        purpose: CallPurpose,
        messages: Vec<ChatMessage>,
    ) -> Result<String, DeliberationError> {
        let request = GenerationRequest::new(purpose, messages);
        debug!(
            purpose = %purpose,
            prompt_tokens = self.truncator.estimate(&request.text()),
            "generation request"
        );
        Ok(self.generator.generate(request).await?)
    }
}

pub(crate) fn report_label(kind: ReportKind, profile: &AssetProfile) -> &'static str {
    match kind {
        ReportKind::Market => "Market research report",
        ReportKind::Sentiment => "Social media sentiment report",
        ReportKind::News => "Latest world affairs news",
        ReportKind::Fundamentals => profile.fundamentals_label,
    }
}

/// Labelled report blocks ready for clamping. Every report must be present.
pub(crate) fn report_blocks(state: &DeliberationState) -> Result<Vec<(String, String)>, DeliberationError> {
    let reports = state.analyst_reports();
    if !reports.is_complete() {
        return Err(DeliberationError::MissingInput("analyst reports"));
    }
    let profile = state.asset_type().profile();
    Ok(ReportKind::ALL
        .into_iter()
        .map(|kind| {
            let label = report_label(kind, profile);
            (label.to_string(), format!("{label}:\n{}", reports.text(kind)))
        })
        .collect())
}

pub(crate) fn labelled_block(label: &str, text: &str) -> (String, String) {
    (label.to_string(), format!("{label}:\n{text}"))
}

/// Borrowed view for [`Truncator::clamp_many_blocks`].
pub(crate) fn as_refs(blocks: &[(String, String)]) -> Vec<(&str, &str)> {
    blocks.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect()
}

/// Append guidance to a system prompt when the profile has any.
pub(crate) fn with_guidance(system: String, profile: &AssetProfile, role: PromptRole) -> String {
    match profile.guidance(role) {
        "" => system,
        guidance => format!("{system}\n\n{guidance}"),
    }
}

fn system_prompt(speaker: InvestmentSpeaker, profile: &AssetProfile) -> (String, PromptRole) {
    match speaker {
        InvestmentSpeaker::Bull => (
            format!(
                "You are a Bull Analyst advocating for investing in the {focus}. Build a strong, \
                 evidence-based case emphasizing growth potential, competitive advantages and \
                 positive market indicators. Engage directly with the bear analyst's points and \
                 refute them with specific data.",
                focus = profile.asset_focus
            ),
            PromptRole::Bull,
        ),
        InvestmentSpeaker::Bear => (
            format!(
                "You are a Bear Analyst making the case against investing in the {focus}. Present \
                 a well-reasoned argument emphasizing risks, challenges and negative indicators. \
                 Engage directly with the bull analyst's points and expose weak or over-optimistic \
                 assumptions.",
                focus = profile.asset_focus
            ),
            PromptRole::Bear,
        ),
    }
}

fn investment_prompt(
    speaker: InvestmentSpeaker,
    subject: &str,
    resources: &str,
    history: &str,
    opponent: &str,
) -> String {
    let opponent_name = match speaker {
        InvestmentSpeaker::Bull => "bear",
        InvestmentSpeaker::Bear => "bull",
    };
    format!(
        "Resources available for {subject}:\n\n{resources}\n\n\
         Conversation history of the debate:\n{history}\n\n\
         Last {opponent_name} argument:\n{opponent}\n\n\
         Deliver a compelling {speaker} argument, respond to the {opponent_name}'s points and \
         engage in a dynamic debate. Use the lessons from similar situations to avoid past mistakes."
    )
}

async fn investment_round(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
    speaker: InvestmentSpeaker,
) -> Result<InvestmentDebateState, DeliberationError> {
    let debate = state.investment_debate_state();
    let profile = state.asset_type().profile();

    let situation = state.analyst_reports().situation();
    let past_memory = ctx.recall(&situation).await?;

    let (system, role) = system_prompt(speaker, profile);
    let system = with_guidance(system, profile, role);
    let subject = profile.describe(state.asset_symbol());
    let frame = [
        ChatMessage::system(system.as_str()),
        ChatMessage::user(investment_prompt(speaker, &subject, "", "", "")),
    ];
    let budget = ctx.budget_after(&frame);

    let mut blocks = report_blocks(state)?;
    blocks.push(labelled_block(PAST_MEMORY_LABEL, &past_memory));
    let resources = ctx
        .truncator
        .clamp_many_blocks(&as_refs(&blocks), budget.share(7, 10))
        .joined();
    let history = ctx.truncator.truncate_tail(&debate.history, budget.share(2, 10));
    let opponent = ctx
        .truncator
        .truncate_tail(&debate.current_response, budget.share(1, 10));
    let user = investment_prompt(speaker, &subject, &resources, &history, &opponent);

    info!(speaker = %speaker, round = debate.count + 1, "investment debate round");
    let purpose = match speaker {
        InvestmentSpeaker::Bull => CallPurpose::Bull,
        InvestmentSpeaker::Bear => CallPurpose::Bear,
    };
    let response = ctx
        .call(
            purpose,
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
        .await?;

    let argument = format!("{}: {}", speaker.label(), response);
    Ok(debate.append(speaker, &argument))
}

/// One bull argument appended to the investment debate.
pub async fn bull_round(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<InvestmentDebateState, DeliberationError> {
    investment_round(ctx, state, InvestmentSpeaker::Bull).await
}

/// One bear argument appended to the investment debate.
pub async fn bear_round(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<InvestmentDebateState, DeliberationError> {
    investment_round(ctx, state, InvestmentSpeaker::Bear).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::asset::AssetType;
    use crate::capability::{MemoryMatch, MockGenerator, MockSituationMemory};
    use crate::error::GenerationError;
    use chrono::NaiveDate;

    /// State with all four reports filled in.
    pub(crate) fn reported_state(asset_type: AssetType) -> DeliberationState {
        let mut state = DeliberationState::new(
            "BTC",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            asset_type,
        );
        for kind in ReportKind::ALL {
            state = state.with_report(kind, format!("{kind} looks constructive")).unwrap();
        }
        state
    }

    /// Every report, and anything else a round reads, far beyond any budget.
    pub(crate) fn oversized_state(asset_type: AssetType) -> DeliberationState {
        let mut state = DeliberationState::new(
            "SOL",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            asset_type,
        );
        for kind in ReportKind::ALL {
            state = state.with_report(kind, format!("{kind} {}", "r".repeat(200_000))).unwrap();
        }
        state
    }

    /// Budgets small, odd and default, with `max_input - reserved` as the ceiling.
    pub(crate) const FIT_BUDGETS: [(i64, i64); 3] = [(1_000, 0), (3_000, 500), (12_000, 2_048)];

    pub(crate) fn memory_with(recommendations: &'static [&'static str]) -> MockSituationMemory {
        let mut memory = MockSituationMemory::new();
        memory.expect_similar().returning(move |_, k| {
            Ok(recommendations
                .iter()
                .take(k)
                .map(|r| MemoryMatch {
                    matched_situation: "past".into(),
                    recommendation: r.to_string(),
                    similarity_score: 0.5,
                })
                .collect())
        });
        memory
    }

    fn ctx<'a>(gen: &'a MockGenerator, mem: &'a MockSituationMemory, t: &'a Truncator) -> RoundContext<'a> {
        RoundContext {
            generator: gen,
            memory: mem,
            truncator: t,
            budget: PromptBudget::default(),
            memory_matches: 2,
        }
    }

    #[tokio::test]
    async fn test_bull_round_appends_labelled_argument() {
        let mut gen = MockGenerator::new();
        gen.expect_generate()
            .withf(|req| req.purpose == CallPurpose::Bull && req.messages.len() == 2)
            .times(1)
            .returning(|_| Ok("adoption is accelerating".into()));
        let mem = memory_with(&["do not chase pumps"]);
        let t = Truncator::heuristic();
        let state = reported_state(AssetType::Cryptocurrency);

        let debate = bull_round(&ctx(&gen, &mem, &t), &state).await.unwrap();
        assert_eq!(debate.count, 1);
        assert_eq!(debate.current_response, "Bull Analyst: adoption is accelerating");
        assert!(debate.history.ends_with("\nBull Analyst: adoption is accelerating"));
        assert_eq!(debate.bear_history, "");
        // Input snapshot is untouched.
        assert_eq!(state.investment_debate_state().count, 0);
    }

    #[tokio::test]
    async fn test_bear_prompt_carries_bull_argument_and_memory() {
        let mut gen = MockGenerator::new();
        gen.expect_generate()
            .withf(|req| {
                let user = &req.messages[1].content;
                req.purpose == CallPurpose::Bear
                    && user.contains("Bull Analyst: to the moon")
                    && user.contains("do not chase pumps")
                    && user.contains("Project analysis")
            })
            .times(1)
            .returning(|_| Ok("valuation is stretched".into()));
        let mem = memory_with(&["do not chase pumps"]);
        let t = Truncator::heuristic();
        let state = reported_state(AssetType::Cryptocurrency);
        let state = state.with_investment_debate(
            state
                .investment_debate_state()
                .append(InvestmentSpeaker::Bull, "Bull Analyst: to the moon"),
        );

        let debate = bear_round(&ctx(&gen, &mem, &t), &state).await.unwrap();
        assert_eq!(debate.count, 2);
        assert_eq!(debate.bull_history, "\nBull Analyst: to the moon");
        assert_eq!(debate.bear_history, "\nBear Analyst: valuation is stretched");
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let mut gen = MockGenerator::new();
        gen.expect_generate()
            .returning(|_| Err(GenerationError::RateLimit("429".into())));
        let mem = memory_with(&[]);
        let t = Truncator::heuristic();
        let state = reported_state(AssetType::Stock);

        let err = bull_round(&ctx(&gen, &mem, &t), &state).await.unwrap_err();
        assert!(matches!(err, DeliberationError::Generation(GenerationError::RateLimit(_))));
    }

    #[tokio::test]
    async fn test_missing_reports_rejected() {
        let gen = MockGenerator::new();
        let mem = memory_with(&[]);
        let t = Truncator::heuristic();
        let state = DeliberationState::new(
            "AAPL",
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            AssetType::Stock,
        );
        let err = bull_round(&ctx(&gen, &mem, &t), &state).await.unwrap_err();
        assert!(matches!(err, DeliberationError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_oversized_history_fits_budget() {
        let huge = "x".repeat(200_000);
        for (max_input, reserved) in FIT_BUDGETS {
            let budget = PromptBudget::new(max_input, reserved);
            let mut gen = MockGenerator::new();
            gen.expect_generate()
                .withf(move |req| {
                    Truncator::heuristic().estimate(&req.text()) <= budget.content_budget_tokens()
                })
                .times(2)
                .returning(|_| Ok("still arguing".into()));
            let mem = memory_with(&["lesson"]);
            let t = Truncator::heuristic();
            let state = oversized_state(AssetType::Cryptocurrency);
            let state = state.with_investment_debate(
                state
                    .investment_debate_state()
                    .append(InvestmentSpeaker::Bull, &huge)
                    .append(InvestmentSpeaker::Bear, &huge),
            );
            let c = RoundContext {
                budget,
                ..ctx(&gen, &mem, &t)
            };
            let debate = bull_round(&c, &state).await.unwrap();
            assert_eq!(debate.count, 3, "budget {max_input}/{reserved}");
            let debate = bear_round(&c, &state.with_investment_debate(debate)).await.unwrap();
            assert_eq!(debate.count, 4, "budget {max_input}/{reserved}");
        }
    }
}
