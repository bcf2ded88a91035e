//! Judge, trader and signal-extraction stages.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::asset::PromptRole;
use crate::capability::{CallPurpose, ChatMessage};
use crate::debate::{as_refs, labelled_block, report_blocks, with_guidance, RoundContext, PAST_MEMORY_LABEL};
use crate::error::DeliberationError;
use crate::state::DeliberationState;

const NO_MEMORIES: &str = "No past memories found.";

/// Final trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// First standalone BUY, SELL or HOLD in `text`, case-insensitive.
    pub fn parse(text: &str) -> Option<Self> {
        text.split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(|word| match word.to_ascii_uppercase().as_str() {
                "BUY" => Some(Self::Buy),
                "SELL" => Some(Self::Sell),
                "HOLD" => Some(Self::Hold),
                _ => None,
            })
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

fn investment_judge_system(focus: &str) -> String {
    format!(
        "As the portfolio manager and debate facilitator, critically evaluate this round of \
         debate about the {focus} and make a definitive decision: align with the bear analyst, \
         the bull analyst, or choose Hold only if it is strongly justified by the arguments. \
         Then develop a detailed investment plan for the trader: your recommendation, the \
         rationale, and concrete strategic actions. Learn from past mistakes."
    )
}

/// Research manager: weighs the bull/bear debate into an investment plan.
pub async fn investment_judge(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<String, DeliberationError> {
    let profile = state.asset_type().profile();
    let past_memory = ctx.recall(&state.analyst_reports().situation()).await?;

    let system = with_guidance(
        investment_judge_system(profile.asset_focus),
        profile,
        PromptRole::InvestmentJudge,
    );
    let subject = profile.describe(state.asset_symbol());
    let user = |reports: &str, history: &str| {
        format!("Subject: {subject}\n\n{reports}\n\nDebate history:\n{history}")
    };
    let budget = ctx.budget_after(&[ChatMessage::system(system.as_str()), ChatMessage::user(user("", ""))]);

    let history = ctx
        .truncator
        .truncate_middle(&state.investment_debate_state().history, budget.share(6, 10));
    let mut blocks = report_blocks(state)?;
    blocks.push(labelled_block(PAST_MEMORY_LABEL, &past_memory));
    let reports = ctx
        .truncator
        .clamp_many_blocks(&as_refs(&blocks), budget.share(3, 10))
        .joined();

    info!(stage = "investment_judge", "judging investment debate");
    ctx.call(
        CallPurpose::InvestmentJudge,
        vec![ChatMessage::system(system), ChatMessage::user(user(&reports, &history))],
    )
    .await
}

fn trader_system(focus: &str, past_memory: &str) -> String {
    format!(
        "You are a trading agent analysing market data to make investment decisions about the \
         {focus}. Based on your analysis, provide a specific recommendation to buy, sell or hold. \
         End with a firm decision and always conclude your response with \
         'FINAL TRANSACTION PROPOSAL: **BUY/HOLD/SELL**' to confirm your recommendation. \
         Apply lessons from past decisions to strengthen your analysis. Here are reflections \
         from similar situations you traded in and the lessons learned: {past_memory}"
    )
}

fn trader_prompt(subject: &str, plan: &str) -> String {
    format!(
        "Based on a comprehensive analysis by a team of analysts, here is an investment plan \
         tailored for {subject}. Use it as a foundation for your next trading decision.\n\n\
         Proposed Investment Plan: {plan}"
    )
}

/// Trader: turns the investment plan into a concrete transaction proposal.
pub async fn trader_stage(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<String, DeliberationError> {
    let plan = state
        .investment_plan()
        .ok_or(DeliberationError::MissingInput("investment_plan"))?;
    let profile = state.asset_type().profile();
    let subject = profile.describe(state.asset_symbol());

    let mut past_memory = ctx.recall(&state.analyst_reports().situation()).await?;
    if past_memory.is_empty() {
        past_memory = NO_MEMORIES.to_string();
    }
    let budget = ctx.budget_after(&[
        ChatMessage::system(with_guidance(
            trader_system(profile.asset_focus, ""),
            profile,
            PromptRole::Trader,
        )),
        ChatMessage::user(trader_prompt(&subject, "")),
    ]);
    let past_memory = ctx.truncator.truncate_middle(&past_memory, budget.share(2, 10));
    let plan = ctx.truncator.truncate_middle(plan, budget.share(6, 10));

    let system = with_guidance(
        trader_system(profile.asset_focus, &past_memory),
        profile,
        PromptRole::Trader,
    );

    info!(stage = "trader", "drafting trader plan");
    ctx.call(
        CallPurpose::Trader,
        vec![ChatMessage::system(system), ChatMessage::user(trader_prompt(&subject, &plan))],
    )
    .await
}

fn risk_judge_system(focus: &str) -> String {
    format!(
        "As the Risk Management Judge and debate facilitator, evaluate the debate between the \
         risky, neutral and safe analysts about the {focus} and determine the best course of \
         action for the trader. Your recommendation must be clear: Buy, Sell or Hold. Choose Hold \
         only if strongly justified by specific arguments. Refine the trader's plan using the \
         analysts' insights and lessons from past mistakes."
    )
}

/// Risk manager: weighs the risk debate into the final trade decision.
pub async fn risk_judge(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<String, DeliberationError> {
    let trader_plan = state
        .trader_investment_plan()
        .ok_or(DeliberationError::MissingInput("trader_investment_plan"))?;
    let profile = state.asset_type().profile();
    let past_memory = ctx.recall(&state.analyst_reports().situation()).await?;

    let system = with_guidance(risk_judge_system(profile.asset_focus), profile, PromptRole::RiskJudge);
    let subject = profile.describe(state.asset_symbol());
    let user = |context: &str, history: &str| {
        format!("Subject: {subject}\n\n{context}\n\nAnalysts debate history:\n{history}")
    };
    let budget = ctx.budget_after(&[ChatMessage::system(system.as_str()), ChatMessage::user(user("", ""))]);

    let history = ctx
        .truncator
        .truncate_middle(&state.risk_debate_state().history, budget.share(6, 10));
    let blocks = [
        labelled_block("Trader's original plan", trader_plan),
        labelled_block(PAST_MEMORY_LABEL, &past_memory),
    ];
    let context = ctx
        .truncator
        .clamp_many_blocks(&as_refs(&blocks), budget.share(3, 10))
        .joined();

    info!(stage = "risk_judge", "judging risk debate");
    ctx.call(
        CallPurpose::RiskJudge,
        vec![ChatMessage::system(system), ChatMessage::user(user(&context, &history))],
    )
    .await
}

const SIGNAL_SYSTEM: &str = "You are an efficient assistant designed to analyze paragraphs or financial \
                             reports provided by a group of analysts. Your task is to extract the investment \
                             decision: SELL, BUY, or HOLD. Provide only the extracted decision (SELL, BUY, or \
                             HOLD) as your output, without adding any additional text or information.";

/// Reduce the final trade decision to a single signal word.
///
/// Returns the raw reply; use [`Signal::parse`] for the typed value.
pub async fn extract_signal(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<String, DeliberationError> {
    let decision = state
        .final_trade_decision()
        .ok_or(DeliberationError::MissingInput("final_trade_decision"))?;
    let budget = ctx.budget_after(&[ChatMessage::system(SIGNAL_SYSTEM), ChatMessage::user("")]);
    let decision = ctx
        .truncator
        .truncate_middle(decision, budget.content_budget_tokens());

    ctx.call(
        CallPurpose::Signal,
        vec![ChatMessage::system(SIGNAL_SYSTEM), ChatMessage::user(decision)],
    )
    .await
}
