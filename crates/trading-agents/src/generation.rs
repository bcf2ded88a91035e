//! Rig-backed [`Generator`] for OpenAI-compatible endpoints.

use async_trait::async_trait;
use deliberation::{ChatMessage, ChatRole, GenerationError, GenerationRequest, Generator};
use rig::client::CompletionClient;
use rig::completion::{Chat, Message};
use rig::providers::openai;
use tracing::debug;

pub struct RigGenerator {
    client: openai::CompletionsClient,
    model: String,
    temperature: f64,
}

impl RigGenerator {
    pub fn new(client: openai::CompletionsClient, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// A request split into the shape rig's chat API expects.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ChatParts {
    pub preamble: String,
    pub prompt: String,
    pub history: Vec<ChatMessage>,
}

/// System messages become the preamble, the last user message the prompt,
/// and earlier user/assistant turns the history.
pub(crate) fn split_messages(messages: &[ChatMessage]) -> Result<ChatParts, GenerationError> {
    let last_user = messages
        .iter()
        .rposition(|m| m.role == ChatRole::User)
        .ok_or_else(|| GenerationError::Inference("request has no user message".into()))?;

    let preamble = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let history = messages[..last_user]
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .cloned()
        .collect();

    Ok(ChatParts {
        preamble,
        prompt: messages[last_user].content.clone(),
        history,
    })
}

/// Whether a provider error message reports rate limiting.
pub(crate) fn is_rate_limited(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["429", "rate limit", "rate_limit", "too many requests"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Map a provider error message onto the generation taxonomy.
pub(crate) fn classify_failure(message: &str) -> GenerationError {
    if is_rate_limited(message) {
        GenerationError::RateLimit(message.to_string())
    } else {
        GenerationError::Inference(message.to_string())
    }
}

fn to_rig(message: ChatMessage) -> Message {
    match message.role {
        ChatRole::Assistant => Message::assistant(message.content),
        _ => Message::user(message.content),
    }
}

#[async_trait]
impl Generator for RigGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let ChatParts {
            preamble,
            prompt,
            history,
        } = split_messages(&request.messages)?;

        let agent = self
            .client
            .agent(&self.model)
            .preamble(&preamble)
            .temperature(self.temperature)
            .build();

        let history: Vec<Message> = history.into_iter().map(to_rig).collect();
        debug!(purpose = %request.purpose, model = %self.model, turns = history.len(), "chat request");
        let response = agent
            .chat(&prompt, history)
            .await
            .map_err(|e| classify_failure(&e.to_string()))?;

        if response.trim().is_empty() {
            return Err(GenerationError::MalformedResponse(format!(
                "{} returned an empty completion",
                self.model
            )));
        }
        Ok(response)
    }
}
