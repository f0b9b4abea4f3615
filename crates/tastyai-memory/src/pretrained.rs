//! Pretrained sentence embeddings via fastembed (feature `fastembed`).
//!
//! Inference is synchronous and CPU bound, so every call runs on the
//! blocking pool with the model behind a mutex.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tastyai_core::{TastyError, TastyResult};
use tracing::info;

use crate::embedding::EmbeddingProvider;

/// Model id persisted in the cache metadata.
pub const MINILM_MODEL_ID: &str = "all-MiniLM-L6-v2";
/// Output dimension of all-MiniLM-L6-v2.
pub const MINILM_DIMENSION: usize = 384;

/// Dense provider backed by the all-MiniLM-L6-v2 sentence transformer.
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedProvider {
    /// Load the model, downloading it into `cache_dir` (or fastembed's
    /// default cache) on first use.
    pub fn all_minilm_l6_v2(cache_dir: Option<PathBuf>) -> TastyResult<Self> {
        let mut options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(options)
            .map_err(|e| TastyError::Embedding(format!("failed to load {MINILM_MODEL_ID}: {e}")))?;
        info!(model = MINILM_MODEL_ID, "Loaded pretrained embedding model");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }

    async fn run(&self, texts: Vec<String>) -> TastyResult<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let expected = texts.len();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| TastyError::Embedding("embedding model lock poisoned".into()))?;
            guard
                .embed(texts, None)
                .map_err(|e| TastyError::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| TastyError::Embedding(format!("embedding task failed: {e}")))??;

        if vectors.len() != expected {
            return Err(TastyError::Embedding(format!(
                "model returned {} vectors for {expected} texts",
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != MINILM_DIMENSION) {
            return Err(TastyError::Embedding(format!(
                "model returned a {}-dimensional vector, expected {MINILM_DIMENSION}",
                bad.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> TastyResult<Vec<f32>> {
        self.run(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| TastyError::Embedding("model returned no vector".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> TastyResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run(texts.iter().map(|t| t.to_string()).collect()).await
    }

    fn dimension(&self) -> usize {
        MINILM_DIMENSION
    }

    fn model_id(&self) -> String {
        MINILM_MODEL_ID.to_string()
    }
}
