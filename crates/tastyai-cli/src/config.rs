use std::path::{Path, PathBuf};

use serde::Deserialize;
use tastyai_memory::{BuildOptions, EmbeddingStrategy};
use tastyai_recommend::{RankerOptions, TieBreak};

#[derive(Debug, Deserialize, Default)]
pub struct TastyConfig {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub vectorizer: VectorizerConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
}

impl TastyConfig {
    /// Parse a config file. A missing file yields the defaults when
    /// `allow_missing` is set.
    pub fn load(path: &Path, allow_missing: bool) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).map_err(|e| {
                anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e)
            }),
            Err(e) if allow_missing && e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_path")]
    pub path: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: default_corpus_path(),
        }
    }
}

/// Dense embedding model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DenseModel {
    /// Hashed bag-of-words, always available offline.
    #[serde(rename = "local")]
    Local,
    /// Pretrained sentence transformer, needs the `fastembed` feature.
    #[serde(rename = "all-minilm-l6-v2", alias = "all-MiniLM-L6-v2")]
    AllMiniLmL6V2,
}

#[derive(Debug, Deserialize)]
pub struct VectorizerConfig {
    #[serde(default = "default_strategy")]
    pub strategy: EmbeddingStrategy,
    #[serde(default = "default_model")]
    pub model: DenseModel,
    /// Where pretrained model files are downloaded.
    #[serde(default)]
    pub model_cache_dir: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default = "default_parallel_batches")]
    pub parallel_batches: usize,
    #[serde(default = "default_true")]
    pub verify_fingerprint: bool,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            model: default_model(),
            model_cache_dir: None,
            chunk_size: default_chunk_size(),
            batch_size: default_batch_size(),
            embedding_dimension: default_embedding_dimension(),
            parallel_batches: default_parallel_batches(),
            verify_fingerprint: true,
        }
    }
}

impl VectorizerConfig {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            chunk_size: self.chunk_size,
            batch_size: self.batch_size,
            parallel_batches: self.parallel_batches,
            verify_fingerprint: self.verify_fingerprint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakKind {
    RowIndex,
    Jitter,
}

#[derive(Debug, Deserialize)]
pub struct RankingConfig {
    #[serde(default = "default_tie_break")]
    pub tie_break: TieBreakKind,
    #[serde(default = "default_jitter_amplitude")]
    pub jitter_amplitude: f32,
    #[serde(default)]
    pub jitter_seed: Option<u64>,
    #[serde(default = "default_top_n")]
    pub default_top_n: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            tie_break: default_tie_break(),
            jitter_amplitude: default_jitter_amplitude(),
            jitter_seed: None,
            default_top_n: default_top_n(),
        }
    }
}

impl RankingConfig {
    pub fn ranker_options(&self) -> RankerOptions {
        let tie_break = match self.tie_break {
            TieBreakKind::RowIndex => TieBreak::RowIndex,
            TieBreakKind::Jitter => TieBreak::Jitter {
                amplitude: self.jitter_amplitude,
                seed: self.jitter_seed,
            },
        };
        RankerOptions { tie_break }
    }
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("./dataset/full_dataset.csv")
}
fn default_strategy() -> EmbeddingStrategy {
    EmbeddingStrategy::Dense
}
fn default_model() -> DenseModel {
    DenseModel::Local
}
fn default_chunk_size() -> usize {
    50_000
}
fn default_batch_size() -> usize {
    32
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_parallel_batches() -> usize {
    4
}
fn default_true() -> bool {
    true
}
fn default_tie_break() -> TieBreakKind {
    TieBreakKind::RowIndex
}
fn default_jitter_amplitude() -> f32 {
    0.01
}
fn default_top_n() -> usize {
    3
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: TastyConfig = toml::from_str("").unwrap();
        assert_eq!(config.vectorizer.strategy, EmbeddingStrategy::Dense);
        assert_eq!(config.vectorizer.model, DenseModel::Local);
        assert_eq!(config.vectorizer.chunk_size, 50_000);
        assert_eq!(config.vectorizer.embedding_dimension, 384);
        assert!(config.vectorizer.verify_fingerprint);
        assert_eq!(config.ranking.default_top_n, 3);
        assert_eq!(config.ranking.ranker_options().tie_break, TieBreak::RowIndex);
    }

    #[test]
    fn test_full_config() {
        let config: TastyConfig = toml::from_str(
            r#"
            [corpus]
            path = "/data/recipes.csv"

            [vectorizer]
            strategy = "sparse"
            chunk_size = 1000

            [ranking]
            tie_break = "jitter"
            jitter_seed = 9
            "#,
        )
        .unwrap();
        assert_eq!(config.corpus.path, PathBuf::from("/data/recipes.csv"));
        assert_eq!(config.vectorizer.strategy, EmbeddingStrategy::Sparse);
        assert_eq!(config.vectorizer.build_options().chunk_size, 1000);
        assert_eq!(config.vectorizer.build_options().batch_size, 32);
        assert_eq!(
            config.ranking.ranker_options().tie_break,
            TieBreak::Jitter {
                amplitude: 0.01,
                seed: Some(9)
            }
        );
    }

    #[test]
    fn test_pretrained_model_key() {
        let config: TastyConfig = toml::from_str(
            r#"
            [vectorizer]
            model = "all-minilm-l6-v2"
            model_cache_dir = "/var/cache/tastyai"
            "#,
        )
        .unwrap();
        assert_eq!(config.vectorizer.model, DenseModel::AllMiniLmL6V2);
        assert_eq!(
            config.vectorizer.model_cache_dir,
            Some(PathBuf::from("/var/cache/tastyai"))
        );
        let alias: TastyConfig =
            toml::from_str("[vectorizer]\nmodel = \"all-MiniLM-L6-v2\"").unwrap();
        assert_eq!(alias.vectorizer.model, DenseModel::AllMiniLmL6V2);
        assert!(toml::from_str::<TastyConfig>("[vectorizer]\nmodel = \"bert\"").is_err());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        assert!(toml::from_str::<TastyConfig>("[vectorizer]\nstrategy = \"bert\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tastyai.toml");
        assert!(TastyConfig::load(&path, true).is_ok());
        assert!(TastyConfig::load(&path, false).is_err());
    }
}
