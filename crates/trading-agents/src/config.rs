//! Runtime configuration for the trading agents binary.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by `main`)
//! 2. Environment variable overrides (e.g. `TRADING_QUICK_MODEL`)
//! 3. Values from the TOML file passed with `--config`
//! 4. Built-in defaults
//!
//! ## Model roles
//!
//! | Role  | Used by                                            |
//! |-------|----------------------------------------------------|
//! | quick | analysts, debaters, trader, signal extraction      |
//! | deep  | investment judge, risk judge                       |
//!
//! ## Memory backends
//!
//! `embedding` (default) ranks past situations with the provider's embedding
//! model. `term_frequency` needs no endpoint and matches on shared words only.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use deliberation::{DeliberationConfig, InMemorySituationStore, Truncator};
use rig::client::EmbeddingsClient;
use rig::providers::openai;
use serde::{Deserialize, Serialize};

use crate::memory::{EmbeddingSituationStore, MemoryHandle, RigEmbedder};

const DEFAULT_BACKEND_URL: &str = "https://api.openai.com/v1";
const DEFAULT_QUICK_MODEL: &str = "gpt-4o-mini";
const DEFAULT_DEEP_MODEL: &str = "o4-mini";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

const ENV_BACKEND_URL: &str = "TRADING_BACKEND_URL";
const ENV_API_KEY: &str = "TRADING_API_KEY";
const ENV_QUICK_MODEL: &str = "TRADING_QUICK_MODEL";
const ENV_DEEP_MODEL: &str = "TRADING_DEEP_MODEL";
const ENV_EMBEDDING_MODEL: &str = "TRADING_EMBEDDING_MODEL";

/// OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL, e.g. `http://localhost:8080/v1`.
    pub backend_url: String,
    /// Local servers accept any non-empty key.
    pub api_key: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend_url: env::var(ENV_BACKEND_URL).unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string()),
            api_key: env::var(ENV_API_KEY).unwrap_or_else(|_| "not-needed".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub quick_think_llm: String,
    pub deep_think_llm: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            quick_think_llm: env::var(ENV_QUICK_MODEL).unwrap_or_else(|_| DEFAULT_QUICK_MODEL.to_string()),
            deep_think_llm: env::var(ENV_DEEP_MODEL).unwrap_or_else(|_| DEFAULT_DEEP_MODEL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackend {
    #[default]
    Embedding,
    TermFrequency,
}

/// Situation memory selection and embedding retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: MemoryBackend,
    pub embedding_model: String,
    /// Embed calls per text, counting the first; only rate limits are retried.
    pub max_attempts: u32,
    /// First backoff delay; doubles per retry.
    pub base_delay_ms: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::default(),
            embedding_model: env::var(ENV_EMBEDDING_MODEL)
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub provider: ProviderConfig,
    pub models: ModelConfig,
    /// Temperature for the quick model.
    pub quick_temperature: f64,
    /// Temperature for the judges (lower = more deterministic).
    pub deep_temperature: f64,
    pub deliberation: DeliberationConfig,
    pub memory: MemoryConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            models: ModelConfig::default(),
            quick_temperature: 0.4,
            deep_temperature: 0.1,
            deliberation: DeliberationConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

impl AgentsConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse agents config TOML")
    }

    /// Overwrite provider and model fields for every key `lookup` resolves.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BACKEND_URL) {
            self.provider.backend_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.provider.api_key = key;
        }
        if let Some(model) = lookup(ENV_QUICK_MODEL) {
            self.models.quick_think_llm = model;
        }
        if let Some(model) = lookup(ENV_DEEP_MODEL) {
            self.models.deep_think_llm = model;
        }
        if let Some(model) = lookup(ENV_EMBEDDING_MODEL) {
            self.memory.embedding_model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("quick_temperature", self.quick_temperature),
            ("deep_temperature", self.deep_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                bail!("{name} must be in [0, 2], got {value}");
            }
        }
        if self.provider.backend_url.trim().is_empty() {
            bail!("provider.backend_url must not be empty");
        }
        if self.memory.backend == MemoryBackend::Embedding && self.memory.embedding_model.trim().is_empty() {
            bail!("memory.embedding_model must not be empty for the embedding backend");
        }
        self.deliberation
            .validate()
            .context("invalid deliberation settings")?;
        Ok(())
    }

    /// Rig OpenAI-compatible client for the configured endpoint.
    pub fn client(&self) -> Result<openai::CompletionsClient> {
        openai::CompletionsClient::builder()
            .api_key(&self.provider.api_key)
            .base_url(&self.provider.backend_url)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build completions client: {e}"))
    }

    /// Rig OpenAI client for the embeddings endpoint of the same provider.
    pub fn embedding_client(&self) -> Result<openai::Client> {
        openai::Client::builder()
            .api_key(&self.provider.api_key)
            .base_url(&self.provider.backend_url)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build embeddings client: {e}"))
    }

    /// Open the configured situation memory, empty.
    pub fn open_memory(&self, truncator: &Truncator) -> Result<MemoryHandle> {
        let budget = self.deliberation.embedding_budget();
        Ok(match self.memory.backend {
            MemoryBackend::TermFrequency => MemoryHandle::new(Arc::new(
                InMemorySituationStore::with_truncator(truncator.clone(), budget),
            )),
            MemoryBackend::Embedding => {
                let model = self
                    .embedding_client()
                    .context("embedding memory client")?
                    .embedding_model(&self.memory.embedding_model);
                let store = EmbeddingSituationStore::new(Arc::new(RigEmbedder::new(model)), budget)
                    .with_truncator(truncator.clone())
                    .with_backoff(
                        self.memory.max_attempts,
                        Duration::from_millis(self.memory.base_delay_ms),
                    );
                MemoryHandle::new(Arc::new(store))
            }
        })
    }
}

/// Whether the endpoint answers `GET {url}/models`.
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
