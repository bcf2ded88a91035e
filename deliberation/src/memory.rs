//! In-process situation memory.
//!
//! Scores past situations by cosine similarity over term-frequency vectors.
//! Several runs may share one store: reads take a shared lock, `record`
//! takes the write lock only for the append.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::budget::Truncator;
use crate::capability::{MemoryMatch, SituationMemory};
use crate::error::MemoryError;

/// One remembered situation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationRecord {
    pub situation: String,
    pub recommendation: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug)]
struct IndexedRecord {
    record: SituationRecord,
    terms: HashMap<String, f64>,
    norm: f64,
}

impl IndexedRecord {
    fn new(record: SituationRecord, truncator: &Truncator, budget: usize) -> Self {
        let terms = term_frequencies(&truncator.truncate_middle(&record.situation, budget));
        let norm = vector_norm(&terms);
        Self { record, terms, norm }
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for term in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *tf.entry(term.to_lowercase()).or_insert(0.0) += 1.0;
    }
    tf
}

fn vector_norm(tf: &HashMap<String, f64>) -> f64 {
    tf.values().map(|v| v * v).sum::<f64>().sqrt()
}

fn cosine(a: &HashMap<String, f64>, a_norm: f64, b: &HashMap<String, f64>, b_norm: f64) -> f64 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(term, v)| large.get(term).map(|w| v * w))
        .sum();
    (dot / (a_norm * b_norm)).clamp(0.0, 1.0)
}

/// Term-frequency similarity store guarded by a tokio `RwLock`.
#[derive(Debug)]
pub struct InMemorySituationStore {
    records: RwLock<Vec<IndexedRecord>>,
    truncator: Truncator,
    embedding_budget: usize,
}

impl InMemorySituationStore {
    pub fn new(embedding_budget: usize) -> Self {
        Self::with_truncator(Truncator::heuristic(), embedding_budget)
    }

    pub fn with_truncator(truncator: Truncator, embedding_budget: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            truncator,
            embedding_budget: embedding_budget.max(1),
        }
    }

    /// Bulk-load `(situation, recommendation)` pairs.
    pub async fn seed(&self, pairs: Vec<(String, String)>) {
        let now = Utc::now();
        let indexed: Vec<IndexedRecord> = pairs
            .into_iter()
            .map(|(situation, recommendation)| {
                IndexedRecord::new(
                    SituationRecord {
                        situation,
                        recommendation,
                        recorded_at: now,
                    },
                    &self.truncator,
                    self.embedding_budget,
                )
            })
            .collect();
        self.records.write().await.extend(indexed);
    }

    /// Restore previously exported records, keeping their timestamps.
    pub async fn load(&self, records: Vec<SituationRecord>) {
        let indexed: Vec<IndexedRecord> = records
            .into_iter()
            .map(|r| IndexedRecord::new(r, &self.truncator, self.embedding_budget))
            .collect();
        self.records.write().await.extend(indexed);
    }

    /// Copy of every stored record, oldest first.
    pub async fn export(&self) -> Vec<SituationRecord> {
        self.records
            .read()
            .await
            .iter()
            .map(|r| r.record.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SituationMemory for InMemorySituationStore {
    async fn similar(&self, situation: &str, k: usize) -> Result<Vec<MemoryMatch>, MemoryError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query = term_frequencies(&self.truncator.truncate_middle(situation, self.embedding_budget));
        let query_norm = vector_norm(&query);

        let records = self.records.read().await;
        let mut scored: Vec<(usize, f64)> = records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, cosine(&query, query_norm, &r.terms, r.norm)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
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
        debug!(stored = records.len(), returned = matches.len(), "memory lookup");
        Ok(matches)
    }

    async fn record(&self, situation: &str, recommendation: &str) -> Result<(), MemoryError> {
        let indexed = IndexedRecord::new(
            SituationRecord {
                situation: situation.to_string(),
                recommendation: recommendation.to_string(),
                recorded_at: Utc::now(),
            },
            &self.truncator,
            self.embedding_budget,
        );
        self.records.write().await.push(indexed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let store = InMemorySituationStore::new(6_000);
        let out = store.similar("rates rising", 2).await.unwrap();
        assert!(out.is_empty());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_most_similar_first() {
        let store = InMemorySituationStore::new(6_000);
        store
            .seed(vec![
                ("tech earnings beat expectations".into(), "lean long".into()),
                ("inflation high rates rising bonds sell off".into(), "reduce duration".into()),
                ("crypto exchange hack".into(), "avoid exchange tokens".into()),
            ])
            .await;
        let out = store.similar("rates rising and inflation high", 2).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].recommendation, "reduce duration");
        assert!(out[0].similarity_score >= out[1].similarity_score);
        assert!(out[0].similarity_score <= 1.0);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemorySituationStore::new(6_000);
        store
            .seed(vec![
                ("alpha".into(), "first".into()),
                ("beta".into(), "second".into()),
            ])
            .await;
        let out = store.similar("gamma", 2).await.unwrap();
        assert_eq!(out[0].recommendation, "first");
        assert_eq!(out[1].recommendation, "second");
        assert_eq!(out[0].similarity_score, 0.0);
    }

    #[tokio::test]
    async fn test_identical_text_scores_one() {
        let store = InMemorySituationStore::new(6_000);
        store.record("Strong Volume breakout", "buy dips").await.unwrap();
        let out = store.similar("strong volume BREAKOUT", 1).await.unwrap();
        assert!((out[0].similarity_score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_export_and_load() {
        let store = InMemorySituationStore::new(6_000);
        store.record("a b c", "x").await.unwrap();
        let exported = store.export().await;
        let restored = InMemorySituationStore::new(6_000);
        restored.load(exported).await;
        assert_eq!(restored.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_record_and_query() {
        let store = Arc::new(InMemorySituationStore::new(6_000));
        let mut handles = Vec::new();
        for i in 0..8 {
            let s = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                s.record(&format!("situation {i}"), &format!("lesson {i}")).await.unwrap();
                s.similar("situation", 2).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len().await, 8);
    }
}
