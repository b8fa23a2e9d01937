//! Long-term memory for agent runs.
//!
//! Entries are ranked by cosine similarity of the query embedding
//! against stored embeddings, with optional importance and category
//! filters applied before ranking and time-based importance decay
//! applied at retrieval. When memory is disabled or no embedding
//! provider is configured, retrieval returns an empty list without
//! error and the runner uses an empty context section.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nx_domain::config::MemoryConfig;
use nx_domain::error::Result;
use nx_domain::id::ProjectId;

/// Default embedding dimensionality for stored entries.
pub const EMBEDDING_DIM: usize = 1536;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Embedding provider seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Produces embedding vectors for retrieval queries and stored content.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub project_id: ProjectId,
    pub category: String,
    pub content: String,
    pub embedding: Vec<f32>,
    /// Base importance in `[0, 1]`.
    pub importance: f64,
    pub access_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl MemoryEntry {
    pub fn new(
        project_id: ProjectId,
        category: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        importance: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id,
            category: category.into(),
            content: content.into(),
            embedding,
            importance: importance.clamp(0.0, 1.0),
            access_count: 0,
            created_at: now,
            last_accessed_at: now,
            metadata: HashMap::new(),
        }
    }
}

/// One retrieval result: the entry plus its ranking score.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub entry: MemoryEntry,
    pub similarity: f32,
    /// Importance after decay at retrieval time.
    pub effective_importance: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Vector math
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cosine similarity between two vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for mismatched
/// lengths or zero-magnitude vectors (avoiding division by zero).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        tracing::warn!(
            len_a = a.len(),
            len_b = b.len(),
            "cosine_similarity: mismatched vector lengths, returning 0.0"
        );
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Importance decay: `importance · 0.5^(age_days / half_life)`.
/// A half-life of zero disables decay.
pub fn decayed_importance(importance: f64, age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return importance;
    }
    importance * 0.5_f64.powf(age_days / half_life_days)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-memory store + retrieval ranking.
pub struct MemoryManager {
    entries: RwLock<Vec<MemoryEntry>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl MemoryManager {
    pub fn new(embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            embedder,
        }
    }

    /// Store an entry as-is (the caller supplies the embedding).
    pub fn store(&self, entry: MemoryEntry) {
        self.entries.write().push(entry);
    }

    /// Embed `content` and store it — used by compaction summaries and
    /// the memory tool. A missing embedder stores a zero vector so the
    /// content is still inspectable, just never ranked first.
    pub async fn store_text(
        &self,
        project: &ProjectId,
        category: &str,
        content: &str,
        importance: f64,
    ) -> Result<String> {
        let embedding = match &self.embedder {
            Some(e) => e.embed(content).await?,
            None => vec![0.0; EMBEDDING_DIM],
        };
        let entry = MemoryEntry::new(project.clone(), category, content, embedding, importance);
        let id = entry.id.clone();
        self.store(entry);
        Ok(id)
    }

    /// Retrieve the top-K most relevant entries for a query.
    ///
    /// Filters (project, min importance, categories) apply before
    /// ranking. Returns an empty list without error when long-term
    /// memory is disabled or no embedder is configured.
    pub async fn retrieve(
        &self,
        project: &ProjectId,
        query: &str,
        config: &MemoryConfig,
        min_importance: Option<f64>,
        categories: Option<&[String]>,
    ) -> Result<Vec<MemoryHit>> {
        if !config.long_term_enabled {
            return Ok(Vec::new());
        }
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };

        let query_embedding = embedder.embed(query).await?;
        let now = Utc::now();

        let mut hits: Vec<MemoryHit> = {
            let entries = self.entries.read();
            entries
                .iter()
                .filter(|e| &e.project_id == project)
                .filter(|e| min_importance.is_none_or(|min| e.importance >= min))
                .filter(|e| {
                    categories.is_none_or(|cats| cats.iter().any(|c| c == &e.category))
                })
                .map(|e| {
                    let age_days =
                        (now - e.created_at).num_seconds().max(0) as f64 / 86_400.0;
                    let effective = decayed_importance(
                        e.importance,
                        age_days,
                        config.decay_half_life_days,
                    );
                    MemoryHit {
                        similarity: cosine_similarity(&query_embedding, &e.embedding),
                        effective_importance: effective,
                        entry: e.clone(),
                    }
                })
                .collect()
        };

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(config.top_k);

        // Bump access stats for what we return.
        {
            let mut entries = self.entries.write();
            for hit in &hits {
                if let Some(e) = entries.iter_mut().find(|e| e.id == hit.entry.id) {
                    e.access_count += 1;
                    e.last_accessed_at = now;
                }
            }
        }

        Ok(hits)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
