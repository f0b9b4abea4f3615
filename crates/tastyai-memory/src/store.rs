use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tastyai_core::{TastyError, TastyResult};
use tracing::{debug, info, warn};

use crate::corpus::{corpus_fingerprint, CorpusReader};
use crate::embedding::{EmbeddingProvider, EmbeddingSpace, EmbeddingStrategy};
use crate::features;
use crate::matrix::{self, MappedMatrix, FORMAT_VERSION};
use crate::tfidf::{SparseVector, TfidfFitter, TfidfModel};

/// Matrix file of the dense strategy.
pub const DENSE_MATRIX_FILE: &str = "embeddings.bin";
/// Matrix file of the sparse strategy.
pub const SPARSE_MATRIX_FILE: &str = "tfidf_matrix.bin";
/// Fitted TF-IDF vocabulary, sparse strategy only.
pub const VOCABULARY_FILE: &str = "tfidf_vocabulary.json";
/// Build metadata shared by both strategies.
pub const METADATA_FILE: &str = "metadata.json";

/// Cache artifact locations, siblings of the corpus file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePaths {
    /// Directory holding the corpus and its cache.
    pub dir: PathBuf,
    /// Dense matrix file.
    pub dense_matrix: PathBuf,
    /// Sparse matrix file.
    pub sparse_matrix: PathBuf,
    /// TF-IDF vocabulary file.
    pub vocabulary: PathBuf,
    /// Build metadata file.
    pub metadata: PathBuf,
}

impl CachePaths {
    /// Cache locations next to `corpus`.
    pub fn for_corpus(corpus: &Path) -> Self {
        let dir = match corpus.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            dense_matrix: dir.join(DENSE_MATRIX_FILE),
            sparse_matrix: dir.join(SPARSE_MATRIX_FILE),
            vocabulary: dir.join(VOCABULARY_FILE),
            metadata: dir.join(METADATA_FILE),
            dir,
        }
    }

    /// Matrix file used by `strategy`.
    pub fn matrix(&self, strategy: EmbeddingStrategy) -> &Path {
        match strategy {
            EmbeddingStrategy::Dense => &self.dense_matrix,
            EmbeddingStrategy::Sparse => &self.sparse_matrix,
        }
    }
}

/// Diagnostics and identity of a completed build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Rows in the matrix, one per corpus record.
    pub num_rows: u64,
    /// Wall-clock build time.
    pub time_taken_secs: f64,
    /// When the build finished.
    pub built_at: DateTime<Utc>,
    /// Space the rows were embedded in.
    pub space: EmbeddingSpace,
    /// Hex SHA-256 of the corpus the cache was built from.
    pub corpus_fingerprint: String,
    /// Matrix format version at build time.
    pub format_version: u16,
}

impl CacheMetadata {
    /// Read metadata, or `None` when the file does not exist.
    pub fn load(path: &Path) -> TastyResult<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| TastyError::corrupt(path, format!("unreadable metadata: {e}")))
    }

    fn save(&self, path: &Path) -> TastyResult<()> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Tuning for the chunked build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Corpus rows held in memory per chunk commit.
    pub chunk_size: usize,
    /// Texts per embedding call (dense only).
    pub batch_size: usize,
    /// Embedding batches in flight at once (dense only).
    pub parallel_batches: usize,
    /// Rebuild when the corpus no longer matches the cached fingerprint.
    pub verify_fingerprint: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            chunk_size: 50_000,
            batch_size: 32,
            parallel_batches: 4,
            verify_fingerprint: true,
        }
    }
}

/// The model bound to a store, used to embed queries into its space.
#[derive(Clone)]
pub(crate) enum Embedder {
    Dense(Arc<dyn EmbeddingProvider>),
    Sparse(Arc<TfidfModel>),
}

impl Embedder {
    fn space(&self) -> EmbeddingSpace {
        match self {
            Embedder::Dense(provider) => provider.space(),
            Embedder::Sparse(model) => sparse_space(model),
        }
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Embedder({})", self.space())
    }
}

fn sparse_space(model: &TfidfModel) -> EmbeddingSpace {
    EmbeddingSpace {
        strategy: EmbeddingStrategy::Sparse,
        model_id: model.model_id(),
        dimension: model.dimension(),
    }
}

/// A query vector in either representation.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    /// Dense embedding.
    Dense(Vec<f32>),
    /// TF-IDF weights over the store vocabulary.
    Sparse(SparseVector),
}

/// A query embedded in a specific space.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedQuery {
    /// Space the query was embedded in.
    pub space: EmbeddingSpace,
    /// The query vector.
    pub vector: QueryVector,
}

impl EmbeddedQuery {
    /// Dense form of the query vector with `dimension` entries.
    pub fn to_dense(&self, dimension: usize) -> Vec<f32> {
        match &self.vector {
            QueryVector::Dense(v) => v.clone(),
            QueryVector::Sparse(v) => v.to_dense(dimension),
        }
    }
}

/// An immutable recipe matrix paired with the model that produced it.
///
/// Safe to share across concurrent ranking requests.
#[derive(Debug)]
pub struct VectorStore {
    matrix: MappedMatrix,
    embedder: Embedder,
    space: EmbeddingSpace,
    metadata: CacheMetadata,
    paths: CachePaths,
}

impl VectorStore {
    /// Space of the stored rows.
    pub fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    /// Strategy of the stored rows.
    pub fn strategy(&self) -> EmbeddingStrategy {
        self.space.strategy
    }

    /// Metadata of the build that produced the cache.
    pub fn metadata(&self) -> &CacheMetadata {
        &self.metadata
    }

    /// Cache file locations.
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Number of recipe rows.
    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    /// Vector length of the stored rows.
    pub fn dimension(&self) -> usize {
        self.space.dimension
    }

    /// Row `row` as a dense vector.
    pub fn row_vector(&self, row: usize) -> Option<Vec<f32>> {
        self.matrix.row_vector(row)
    }

    /// Embed free text with the model bound to this store.
    pub async fn embed_query(&self, text: &str) -> TastyResult<EmbeddedQuery> {
        let vector = match &self.embedder {
            Embedder::Dense(provider) => {
                let v = provider.embed(text).await?;
                if v.len() != self.space.dimension {
                    return Err(TastyError::Embedding(format!(
                        "provider returned {} values, store expects {}",
                        v.len(),
                        self.space.dimension
                    )));
                }
                QueryVector::Dense(v)
            }
            Embedder::Sparse(model) => QueryVector::Sparse(model.transform(text)),
        };
        Ok(EmbeddedQuery {
            space: self.space.clone(),
            vector,
        })
    }

    /// Cosine similarity of `query` against every row, in row order.
    ///
    /// Fails with [`TastyError::EmbeddingSpaceMismatch`] unless the query was
    /// embedded in this store's space.
    pub fn similarity_scores(&self, query: &EmbeddedQuery) -> TastyResult<Vec<f32>> {
        if query.space != self.space {
            return Err(TastyError::EmbeddingSpaceMismatch {
                expected: self.space.to_string(),
                found: query.space.to_string(),
            });
        }
        self.matrix.cosine_scores(&query.to_dense(self.space.dimension))
    }
}

enum StrategyRequest {
    Dense(Arc<dyn EmbeddingProvider>),
    Sparse,
}

/// Builds a [`VectorStore`] from a corpus or reloads it from the sibling cache.
pub struct VectorStoreBuilder {
    request: StrategyRequest,
    options: BuildOptions,
}

impl VectorStoreBuilder {
    /// Dense strategy with an injected embedding provider.
    pub fn dense(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            request: StrategyRequest::Dense(provider),
            options: BuildOptions::default(),
        }
    }

    /// Sparse strategy, fit on the corpus named entities.
    pub fn sparse() -> Self {
        Self {
            request: StrategyRequest::Sparse,
            options: BuildOptions::default(),
        }
    }

    /// Override chunking, batching and staleness settings.
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// Strategy this builder produces.
    pub fn strategy(&self) -> EmbeddingStrategy {
        match self.request {
            StrategyRequest::Dense(_) => EmbeddingStrategy::Dense,
            StrategyRequest::Sparse => EmbeddingStrategy::Sparse,
        }
    }

    /// Load the cached store for `corpus`, building it first on a miss.
    ///
    /// A cache built with another strategy is an error; use [`rebuild`]
    /// to replace it. With `verify_fingerprint`, a cache built from
    /// different corpus contents is rebuilt.
    ///
    /// [`rebuild`]: VectorStoreBuilder::rebuild
    pub async fn build_or_load(&self, corpus: &Path) -> TastyResult<VectorStore> {
        let strategy = self.strategy();
        let paths = CachePaths::for_corpus(corpus);
        let matrix_path = paths.matrix(strategy);
        let metadata = CacheMetadata::load(&paths.metadata)?;

        let Some(metadata) = metadata else {
            if matrix_path.exists() {
                return Err(TastyError::corrupt(
                    matrix_path,
                    "matrix present without metadata; an earlier build may have been interrupted",
                ));
            }
            info!(corpus = %corpus.display(), strategy = %strategy, "No vector cache found, building");
            return self.build(corpus, &paths).await;
        };

        if metadata.space.strategy != strategy {
            return Err(TastyError::EmbeddingSpaceMismatch {
                expected: metadata.space.to_string(),
                found: format!("{strategy} strategy"),
            });
        }

        if !matrix_path.exists() {
            warn!(path = %matrix_path.display(), "Metadata present but matrix missing, rebuilding");
            return self.build(corpus, &paths).await;
        }

        if self.options.verify_fingerprint {
            let fingerprint = fingerprint_of(corpus)?;
            if fingerprint != metadata.corpus_fingerprint {
                warn!(
                    corpus = %corpus.display(),
                    cached = %metadata.corpus_fingerprint,
                    current = %fingerprint,
                    "Corpus changed since the cache was built, rebuilding"
                );
                return self.build(corpus, &paths).await;
            }
        }

        let store = self.open(metadata, paths)?;
        info!(
            rows = store.rows(),
            space = %store.space,
            "Loaded vector store from cache"
        );
        Ok(store)
    }

    /// Discard any cache for `corpus` and build from scratch.
    pub async fn rebuild(&self, corpus: &Path) -> TastyResult<VectorStore> {
        let paths = CachePaths::for_corpus(corpus);
        self.build(corpus, &paths).await
    }

    async fn build(&self, corpus: &Path, paths: &CachePaths) -> TastyResult<VectorStore> {
        let start = Instant::now();
        let strategy = self.strategy();
        let fingerprint = fingerprint_of(corpus)?;

        // A matrix without metadata marks an unfinished build.
        remove_if_exists(&paths.metadata)?;

        let (space, rows) = match &self.request {
            StrategyRequest::Dense(provider) => self.build_dense(provider, corpus, paths).await?,
            StrategyRequest::Sparse => self.build_sparse(corpus, paths)?,
        };

        let metadata = CacheMetadata {
            num_rows: rows,
            time_taken_secs: start.elapsed().as_secs_f64(),
            built_at: Utc::now(),
            space,
            corpus_fingerprint: fingerprint,
            format_version: FORMAT_VERSION,
        };
        metadata.save(&paths.metadata)?;
        info!(
            rows,
            strategy = %strategy,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Vector store built"
        );
        self.open(metadata, paths.clone())
    }

    async fn build_dense(
        &self,
        provider: &Arc<dyn EmbeddingProvider>,
        corpus: &Path,
        paths: &CachePaths,
    ) -> TastyResult<(EmbeddingSpace, u64)> {
        let space = provider.space();
        let dimension = space.dimension;
        let matrix_path = paths.matrix(EmbeddingStrategy::Dense);
        let mut reader = CorpusReader::open(corpus, self.options.chunk_size)?;
        matrix::initialize(matrix_path, EmbeddingStrategy::Dense, dimension)?;

        let mut rows = 0u64;
        let mut chunk_no = 0usize;
        while let Some(chunk) = reader.next_chunk()? {
            let texts: Vec<String> = chunk
                .iter()
                .map(|r| features::features_for(EmbeddingStrategy::Dense, r))
                .collect();
            let vectors = self.embed_texts(provider.as_ref(), &texts, dimension).await?;
            let body = matrix::encode_dense(&vectors, dimension)?;
            rows = matrix::append_rows(
                matrix_path,
                EmbeddingStrategy::Dense,
                dimension,
                vectors.len() as u64,
                &body,
            )?;
            chunk_no += 1;
            info!(
                chunk = chunk_no,
                rows,
                corpus_rows = reader.rows_read(),
                "Committed dense chunk"
            );
        }
        Ok((space, rows))
    }

    /// Embed `texts` in sub-batches, several batches in flight, preserving order.
    async fn embed_texts(
        &self,
        provider: &dyn EmbeddingProvider,
        texts: &[String],
        dimension: usize,
    ) -> TastyResult<Vec<Vec<f32>>> {
        let batches: Vec<Vec<&str>> = texts
            .chunks(self.options.batch_size.max(1))
            .map(|batch| batch.iter().map(String::as_str).collect())
            .collect();

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches.iter())
            .map(move |batch| provider.embed_batch(batch))
            .buffered(self.options.parallel_batches.max(1))
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        if vectors.len() != texts.len() {
            return Err(TastyError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(TastyError::Embedding(format!(
                "provider returned a vector of {} values, expected {dimension}",
                bad.len()
            )));
        }
        Ok(vectors)
    }

    fn build_sparse(
        &self,
        corpus: &Path,
        paths: &CachePaths,
    ) -> TastyResult<(EmbeddingSpace, u64)> {
        // Pass 1: document frequencies.
        let mut fitter = TfidfFitter::new();
        let mut reader = CorpusReader::open(corpus, self.options.chunk_size)?;
        while let Some(chunk) = reader.next_chunk()? {
            for record in &chunk {
                let text = features::features_for(EmbeddingStrategy::Sparse, record);
                fitter.add_document(&text);
            }
            debug!(corpus_rows = reader.rows_read(), "Counted document frequencies");
        }
        let model = fitter.finish();
        model.save(&paths.vocabulary)?;
        debug!(
            terms = model.dimension(),
            documents = model.documents(),
            "Fitted TF-IDF vocabulary"
        );

        // Pass 2: transform and commit.
        let dimension = model.dimension();
        let matrix_path = paths.matrix(EmbeddingStrategy::Sparse);
        matrix::initialize(matrix_path, EmbeddingStrategy::Sparse, dimension)?;
        let mut reader = CorpusReader::open(corpus, self.options.chunk_size)?;
        let mut rows = 0u64;
        let mut chunk_no = 0usize;
        while let Some(chunk) = reader.next_chunk()? {
            let vectors: Vec<SparseVector> = chunk
                .iter()
                .map(|r| {
                    let text = features::features_for(EmbeddingStrategy::Sparse, r);
                    model.transform(&text)
                })
                .collect();
            rows = matrix::append_rows(
                matrix_path,
                EmbeddingStrategy::Sparse,
                dimension,
                vectors.len() as u64,
                &matrix::encode_sparse(&vectors),
            )?;
            chunk_no += 1;
            info!(
                chunk = chunk_no,
                rows,
                corpus_rows = reader.rows_read(),
                "Committed sparse chunk"
            );
        }
        Ok((sparse_space(&model), rows))
    }

    /// Map the cached matrix and cross-check it against the metadata and
    /// the requested embedder.
    fn open(&self, metadata: CacheMetadata, paths: CachePaths) -> TastyResult<VectorStore> {
        let strategy = self.strategy();
        let matrix_path = paths.matrix(strategy).to_path_buf();
        let matrix = MappedMatrix::open(&matrix_path)?;
        let header = matrix.header();

        if header.strategy != metadata.space.strategy {
            return Err(TastyError::corrupt(
                &matrix_path,
                format!(
                    "matrix holds {} rows but metadata records {}",
                    header.strategy, metadata.space.strategy
                ),
            ));
        }
        if header.rows != metadata.num_rows {
            return Err(TastyError::corrupt(
                &matrix_path,
                format!(
                    "matrix has {} rows but metadata records {}",
                    header.rows, metadata.num_rows
                ),
            ));
        }
        if header.dimension() != metadata.space.dimension {
            return Err(TastyError::corrupt(
                &matrix_path,
                format!(
                    "matrix has {} dims but metadata records {}",
                    header.dimension, metadata.space.dimension
                ),
            ));
        }

        let embedder = match &self.request {
            StrategyRequest::Dense(provider) => {
                let space = provider.space();
                if space != metadata.space {
                    return Err(TastyError::EmbeddingSpaceMismatch {
                        expected: metadata.space.to_string(),
                        found: space.to_string(),
                    });
                }
                Embedder::Dense(Arc::clone(provider))
            }
            StrategyRequest::Sparse => {
                let model = TfidfModel::load(&paths.vocabulary).map_err(|e| match e {
                    TastyError::Io(io) => TastyError::corrupt(
                        &paths.vocabulary,
                        format!("cannot read vocabulary: {io}"),
                    ),
                    other => other,
                })?;
                if sparse_space(&model) != metadata.space {
                    return Err(TastyError::corrupt(
                        &paths.vocabulary,
                        format!(
                            "vocabulary describes {} but metadata records {}",
                            sparse_space(&model),
                            metadata.space
                        ),
                    ));
                }
                Embedder::Sparse(Arc::new(model))
            }
        };

        Ok(VectorStore {
            matrix,
            space: metadata.space.clone(),
            embedder,
            metadata,
            paths,
        })
    }
}

fn fingerprint_of(corpus: &Path) -> TastyResult<String> {
    corpus_fingerprint(corpus)
        .map_err(|e| TastyError::corpus(corpus, format!("cannot read corpus: {e}")))
}

fn remove_if_exists(path: &Path) -> TastyResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbedding;

    const CORPUS: &str = "title,ingredients,directions,NER
Pasta,\"['pasta', 'tomato']\",\"['Boil.']\",\"['pasta', 'tomato', 'basil']\"
Salad,\"['lettuce', 'cucumber']\",\"['Toss.']\",\"['lettuce', 'cucumber']\"
Cake,\"['sugar', 'flour']\",\"['Bake.']\",\"['sugar', 'flour', 'cocoa']\"
";

    fn corpus_in(dir: &Path) -> PathBuf {
        let path = dir.join("recipes.csv");
        std::fs::write(&path, CORPUS).unwrap();
        path
    }

    fn small_chunks() -> BuildOptions {
        BuildOptions {
            chunk_size: 2,
            batch_size: 1,
            ..BuildOptions::default()
        }
    }

    #[test]
    fn test_cache_paths_are_siblings() {
        let paths = CachePaths::for_corpus(Path::new("/data/recipes.csv"));
        assert_eq!(paths.dense_matrix, PathBuf::from("/data/embeddings.bin"));
        assert_eq!(paths.vocabulary, PathBuf::from("/data/tfidf_vocabulary.json"));
        let bare = CachePaths::for_corpus(Path::new("recipes.csv"));
        assert_eq!(bare.metadata, PathBuf::from("./metadata.json"));
    }

    #[tokio::test]
    async fn test_dense_build_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus_in(dir.path());
        let builder =
            VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(32))).with_options(small_chunks());

        let built = builder.build_or_load(&corpus).await.unwrap();
        assert_eq!(built.rows(), 3);
        assert_eq!(built.metadata().num_rows, 3);
        assert_eq!(built.space().dimension, 32);

        let loaded = builder.build_or_load(&corpus).await.unwrap();
        assert_eq!(loaded.metadata(), built.metadata());
        assert_eq!(loaded.row_vector(1), built.row_vector(1));
    }

    #[tokio::test]
    async fn test_sparse_query_scores_matching_row_highest() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus_in(dir.path());
        let store = VectorStoreBuilder::sparse()
            .with_options(small_chunks())
            .build_or_load(&corpus)
            .await
            .unwrap();
        assert_eq!(store.strategy(), EmbeddingStrategy::Sparse);
        assert!(store.paths().vocabulary.exists());

        let query = store.embed_query("cocoa sugar").await.unwrap();
        let scores = store.similarity_scores(&query).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores[2] > scores[0]);
        assert!(scores[2] > scores[1]);
    }

    #[tokio::test]
    async fn test_foreign_query_space_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus_in(dir.path());
        let store = VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(16)))
            .build_or_load(&corpus)
            .await
            .unwrap();
        let foreign = EmbeddedQuery {
            space: LocalEmbedding::new(8).space(),
            vector: QueryVector::Dense(vec![0.0; 8]),
        };
        let err = store.similarity_scores(&foreign).unwrap_err();
        assert!(matches!(err, TastyError::EmbeddingSpaceMismatch { .. }));
    }

    #[tokio::test]
    async fn test_matrix_without_metadata_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = corpus_in(dir.path());
        let builder = VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(16)));
        let store = builder.build_or_load(&corpus).await.unwrap();
        std::fs::remove_file(&store.paths().metadata).unwrap();
        drop(store);

        let err = builder.build_or_load(&corpus).await.unwrap_err();
        assert!(err.is_cache_corruption());
        // An explicit rebuild recovers.
        assert_eq!(builder.rebuild(&corpus).await.unwrap().rows(), 3);
    }

    #[tokio::test]
    async fn test_empty_corpus_builds_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("recipes.csv");
        std::fs::write(&corpus, "title,ingredients,directions,NER\n").unwrap();
        let store = VectorStoreBuilder::sparse().build_or_load(&corpus).await.unwrap();
        assert_eq!(store.rows(), 0);
        let query = store.embed_query("anything").await.unwrap();
        assert!(store.similarity_scores(&query).unwrap().is_empty());
    }
}
