use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tastyai_core::{TastyError, TastyResult};

/// Which family of vectors a store holds. Fixed for the lifetime of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStrategy {
    /// Pretrained dense embeddings, no corpus fitting.
    Dense,
    /// TF-IDF vectors fit on the corpus named entities.
    Sparse,
}

impl EmbeddingStrategy {
    pub(crate) fn tag(self) -> u8 {
        match self {
            EmbeddingStrategy::Dense => 1,
            EmbeddingStrategy::Sparse => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EmbeddingStrategy::Dense),
            2 => Some(EmbeddingStrategy::Sparse),
            _ => None,
        }
    }
}

impl fmt::Display for EmbeddingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingStrategy::Dense => write!(f, "dense"),
            EmbeddingStrategy::Sparse => write!(f, "sparse"),
        }
    }
}

impl std::str::FromStr for EmbeddingStrategy {
    type Err = TastyError;

    fn from_str(s: &str) -> TastyResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(EmbeddingStrategy::Dense),
            "sparse" | "tfidf" => Ok(EmbeddingStrategy::Sparse),
            other => Err(TastyError::InvalidArgument(format!(
                "unknown embedding strategy '{other}' (expected 'dense' or 'sparse')"
            ))),
        }
    }
}

/// Identity of an embedding space. Two vectors are comparable only when
/// they were produced in equal spaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSpace {
    /// Dense or sparse.
    pub strategy: EmbeddingStrategy,
    /// Model identifier, e.g. `all-MiniLM-L6-v2` or `tfidf-1234`.
    pub model_id: String,
    /// Vector length.
    pub dimension: usize,
}

impl fmt::Display for EmbeddingSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({} dims)", self.strategy, self.model_id, self.dimension)
    }
}

/// Trait for computing text embeddings (vector representations).
///
/// Implementations are the dense strategy's injected capability: the store
/// builder and the ranker receive the same handle explicitly.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute embedding vector for a single text.
    async fn embed(&self, text: &str) -> TastyResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str]) -> TastyResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Stable identifier of the model, persisted with the cache.
    fn model_id(&self) -> String;

    /// The space this provider embeds into.
    fn space(&self) -> EmbeddingSpace {
        EmbeddingSpace {
            strategy: EmbeddingStrategy::Dense,
            model_id: self.model_id(),
            dimension: self.dimension(),
        }
    }
}

/// Local bag-of-words embedding (no external model needed).
/// Hashes word frequencies into a fixed number of dimensions, then L2-normalizes.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Embedder with `dimension` hash buckets (at least 1).
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> TastyResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty() && w.len() > 1)
            .collect();

        // Count word frequencies
        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word).or_insert(0.0) += 1.0;
        }

        let total = words.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        // Several hash positions per word spread collisions out
        for (word, count) in &freq {
            let tf = count / total;
            let hash1 = simple_hash(word.as_bytes()) as usize;
            let hash2 = simple_hash(&[word.as_bytes(), &[1u8]].concat()) as usize;
            let hash3 = simple_hash(&[word.as_bytes(), &[2u8]].concat()) as usize;

            vector[hash1 % self.dimension] += tf;
            vector[hash2 % self.dimension] += tf * 0.7;
            vector[hash3 % self.dimension] += tf * 0.5;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> String {
        format!("local-hash-{}", self.dimension)
    }
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Simple deterministic hash function (FNV-1a).
fn simple_hash(data: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
