//! Situation memory for the binary: provider embeddings, with the core
//! term-frequency store as the offline fallback.
//!
//! Both stores expose [`PersistentMemory`] so the CLI can restore past
//! situations from disk and write them back after a run.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deliberation::{InMemorySituationStore, MemoryError, MemoryMatch, SituationMemory, SituationRecord, Truncator};
use rig::embeddings::EmbeddingModel;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::generation::is_rate_limited;

/// Turns situation text into a dense vector.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, MemoryError>;
}

/// [`Embedder`] over any rig embedding model.
pub struct RigEmbedder<M> {
    model: M,
}

impl<M> RigEmbedder<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<M> Embedder for RigEmbedder<M>
where
    M: EmbeddingModel + Send + Sync,
{
    async fn embed(&self, text: &str) -> Result<Vec<f64>, MemoryError> {
        let embedding = self.model.embed_text(text).await.map_err(|e| {
            let message = e.to_string();
            if is_rate_limited(&message) {
                MemoryError::RateLimit(message)
            } else {
                MemoryError::Backend(message)
            }
        })?;
        if embedding.vec.is_empty() {
            return Err(MemoryError::Backend("embedding model returned an empty vector".into()));
        }
        Ok(embedding.vec)
    }
}

/// Cosine similarity clamped to `[0, 1]`. Mismatched dimensions score 0.
fn cosine(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }
}

struct EmbeddedRecord {
    record: SituationRecord,
    vector: Vec<f64>,
}

/// Situation store ranked by embedding similarity.
///
/// Text is middle-truncated to the embedding budget before every embed call.
/// Rate-limited calls are retried with exponential backoff; other failures
/// surface immediately.
pub struct EmbeddingSituationStore {
    embedder: Arc<dyn Embedder>,
    truncator: Truncator,
    embedding_budget: usize,
    max_attempts: u32,
    base_delay: Duration,
    records: RwLock<Vec<EmbeddedRecord>>,
}

impl EmbeddingSituationStore {
    pub fn new(embedder: Arc<dyn Embedder>, embedding_budget: usize) -> Self {
        Self {
            embedder,
            truncator: Truncator::heuristic(),
            embedding_budget: embedding_budget.max(1),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn with_truncator(mut self, truncator: Truncator) -> Self {
        self.truncator = truncator;
        self
    }

    /// `max_attempts` counts the first call; the delay doubles per retry.
    pub fn with_backoff(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f64>, MemoryError> {
        let text = self.truncator.truncate_middle(text, self.embedding_budget);
        let mut attempt = 0;
        loop {
            match self.embedder.embed(&text).await {
                Err(MemoryError::RateLimit(reason)) if attempt + 1 < self.max_attempts => {
                    let delay = self.base_delay.saturating_mul(1 << attempt.min(16));
                    warn!(attempt = attempt + 1, ?delay, %reason, "embedding rate limited, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl SituationMemory for EmbeddingSituationStore {
    async fn similar(&self, situation: &str, k: usize) -> Result<Vec<MemoryMatch>, MemoryError> {
        if k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }
        let query = self.embed(situation).await?;

        let records = self.records.read().await;
        let mut scored: Vec<(usize, f64)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, cosine(&query, &r.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let matches: Vec<MemoryMatch> = scored
            .into_iter()
            .take(k)
            .map(|(i, score)| MemoryMatch {
                matched_situation: records[i].record.situation.clone(),
                recommendation: records[i].record.recommendation.clone(),
                similarity_score: score,
            })
            .collect();
        debug!(stored = records.len(), returned = matches.len(), "embedding memory lookup");
        Ok(matches)
    }

    async fn record(&self, situation: &str, recommendation: &str) -> Result<(), MemoryError> {
        let vector = self.embed(situation).await?;
        self.records.write().await.push(EmbeddedRecord {
            record: SituationRecord {
                situation: situation.to_string(),
                recommendation: recommendation.to_string(),
                recorded_at: Utc::now(),
            },
            vector,
        });
        Ok(())
    }
}

/// Load and dump the records behind a [`SituationMemory`].
#[async_trait]
pub trait PersistentMemory: Send + Sync {
    /// Add previously exported records, keeping their timestamps.
    async fn restore(&self, records: Vec<SituationRecord>) -> Result<(), MemoryError>;

    /// Every stored record, oldest first.
    async fn snapshot(&self) -> Vec<SituationRecord>;
}

#[async_trait]
impl PersistentMemory for InMemorySituationStore {
    async fn restore(&self, records: Vec<SituationRecord>) -> Result<(), MemoryError> {
        self.load(records).await;
        Ok(())
    }

    async fn snapshot(&self) -> Vec<SituationRecord> {
        self.export().await
    }
}

#[async_trait]
impl PersistentMemory for EmbeddingSituationStore {
    /// Vectors are not persisted, so every record is embedded again.
    async fn restore(&self, records: Vec<SituationRecord>) -> Result<(), MemoryError> {
        let mut embedded = Vec::with_capacity(records.len());
        for record in records {
            let vector = self.embed(&record.situation).await?;
            embedded.push(EmbeddedRecord { record, vector });
        }
        self.records.write().await.extend(embedded);
        Ok(())
    }

    async fn snapshot(&self) -> Vec<SituationRecord> {
        self.records
            .read()
            .await
            .iter()
            .map(|r| r.record.clone())
            .collect()
    }
}

/// One store seen through both of its roles.
#[derive(Clone)]
pub struct MemoryHandle {
    pub lookup: Arc<dyn SituationMemory>,
    pub persistence: Arc<dyn PersistentMemory>,
}

impl MemoryHandle {
    pub fn new<S>(store: Arc<S>) -> Self
    where
        S: SituationMemory + PersistentMemory + 'static,
    {
        Self {
            lookup: Arc::clone(&store) as Arc<dyn SituationMemory>,
            persistence: store,
        }
    }
}
