//! Risky/safe/neutral risk debate rounds.

use tracing::info;

use crate::asset::AssetProfile;
use crate::capability::{CallPurpose, ChatMessage};
use crate::debate::{as_refs, labelled_block, report_blocks, with_guidance, RoundContext, PAST_MEMORY_LABEL};
use crate::error::DeliberationError;
use crate::state::{DeliberationState, RiskDebateState, RiskSpeaker};

const TRADER_PLAN_LABEL: &str = "Trader's decision";

fn stance(speaker: RiskSpeaker, profile: &AssetProfile) -> String {
    let focus = profile.asset_focus;
    match speaker {
        RiskSpeaker::Risky => format!(
            "You are the Risky Risk Analyst. Champion high-reward, high-risk opportunities in \
             the {focus} and argue for bold strategies. Challenge cautious and neutral positions \
             directly, showing where their caution misses critical upside."
        ),
        RiskSpeaker::Safe => format!(
            "You are the Safe Risk Analyst. Protect assets, minimise volatility and favour \
             steady, reliable growth in the {focus}. Scrutinise high-risk elements of the trader's \
             plan and counter the risky and neutral analysts where they overlook threats."
        ),
        RiskSpeaker::Neutral => format!(
            "You are the Neutral Risk Analyst. Offer a balanced view of the {focus}, weighing \
             benefits against risks. Challenge both the risky and safe analysts where they are \
             too optimistic or too cautious and argue for a moderate, sustainable strategy."
        ),
    }
}

fn purpose(speaker: RiskSpeaker) -> CallPurpose {
    match speaker {
        RiskSpeaker::Risky => CallPurpose::Risky,
        RiskSpeaker::Safe => CallPurpose::Safe,
        RiskSpeaker::Neutral => CallPurpose::Neutral,
    }
}

/// The two sides a speaker responds to, in rotation order.
fn opponents(speaker: RiskSpeaker) -> [RiskSpeaker; 2] {
    let first = speaker.next();
    [first, first.next()]
}

fn risk_prompt(subject: &str, resources: &str, history: &str, latest: [(RiskSpeaker, &str); 2]) -> String {
    let mut user = format!(
        "Context for {subject}:\n\n{resources}\n\n\
         Conversation history of the risk debate:\n{history}\n"
    );
    for (other, argument) in latest {
        user.push_str(&format!("\nLast {other} analyst argument:\n{argument}\n"));
    }
    user.push_str(
        "\nRespond to the other analysts' points directly and argue whether the trader's \
         decision should be adjusted. If another side has not spoken yet, make your own case.",
    );
    user
}

async fn risk_round(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
    speaker: RiskSpeaker,
) -> Result<RiskDebateState, DeliberationError> {
    let trader_plan = state
        .trader_investment_plan()
        .ok_or(DeliberationError::MissingInput("trader_investment_plan"))?;
    let debate = state.risk_debate_state();
    let profile = state.asset_type().profile();

    let past_memory = ctx.recall(&state.analyst_reports().situation()).await?;

    let system = with_guidance(stance(speaker, profile), profile, speaker.prompt_role());
    let subject = profile.describe(state.asset_symbol());
    let [first, second] = opponents(speaker);
    let frame = [
        ChatMessage::system(system.as_str()),
        ChatMessage::user(risk_prompt(&subject, "", "", [(first, ""), (second, "")])),
    ];
    let budget = ctx.budget_after(&frame);

    let mut blocks = report_blocks(state)?;
    blocks.push(labelled_block(TRADER_PLAN_LABEL, trader_plan));
    blocks.push(labelled_block(PAST_MEMORY_LABEL, &past_memory));
    let resources = ctx
        .truncator
        .clamp_many_blocks(&as_refs(&blocks), budget.share(7, 10))
        .joined();
    let history = ctx.truncator.truncate_tail(&debate.history, budget.share(2, 10));
    // Both opponents split the tenth reserved for the latest arguments.
    let latest = |other: RiskSpeaker| {
        ctx.truncator
            .truncate_tail(debate.latest_response(other), budget.share(1, 20))
    };
    let (first_latest, second_latest) = (latest(first), latest(second));
    let user = risk_prompt(
        &subject,
        &resources,
        &history,
        [(first, first_latest.as_str()), (second, second_latest.as_str())],
    );

    info!(speaker = %speaker, round = debate.count + 1, "risk debate round");
    let response = ctx
        .call(
            purpose(speaker),
            vec![ChatMessage::system(system), ChatMessage::user(user)],
        )
        .await?;

    let argument = format!("{}: {}", speaker.label(), response);
    Ok(debate.append(speaker, &argument))
}

/// One risky argument appended to the risk debate.
pub async fn risky_round(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<RiskDebateState, DeliberationError> {
    risk_round(ctx, state, RiskSpeaker::Risky).await
}

/// One safe argument appended to the risk debate.
pub async fn safe_round(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<RiskDebateState, DeliberationError> {
    risk_round(ctx, state, RiskSpeaker::Safe).await
}

/// One neutral argument appended to the risk debate.
pub async fn neutral_round(
    ctx: &RoundContext<'_>,
    state: &DeliberationState,
) -> Result<RiskDebateState, DeliberationError> {
    risk_round(ctx, state, RiskSpeaker::Neutral).await
}
