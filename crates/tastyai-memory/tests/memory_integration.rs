#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the tastyai-memory crate.
//!
//! Covers cache idempotence for both strategies, chunked builds, corpus
//! format errors, strategy and space mismatches, fingerprint-driven
//! rebuilds, and corruption detection.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use tastyai_core::{TastyError, TastyResult};
use tastyai_memory::{
    features, BuildOptions, CorpusReader, EmbeddingProvider, EmbeddingStrategy, LocalEmbedding,
    RecipeCatalog, VectorStore, VectorStoreBuilder,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CORPUS: &str = r#",title,ingredients,directions,link,source,NER
0,No-Bake Nut Cookies,"[""1 c. firmly packed brown sugar"", ""1/2 c. evaporated milk"", ""2 Tbsp. butter""]","[""In a heavy 2-quart saucepan, mix brown sugar, milk and butter."", ""Boil and stir 5 minutes.""]",www.cookbooks.com/Recipe-Details.aspx?id=44874,Gathered,"[""brown sugar"", ""milk"", ""butter""]"
1,Jewell Ball'S Chicken,"[""1 small jar chipped beef, cut up"", ""4 boned chicken breasts"", ""1 can cream of mushroom soup""]","[""Place chipped beef on bottom of baking dish."", ""Bake at 275 for 3 hours.""]",www.cookbooks.com/Recipe-Details.aspx?id=699419,Gathered,"[""beef"", ""chicken breasts"", ""cream of mushroom soup""]"
2,Creamy Corn,"[""2 (16 oz.) pkg. frozen corn"", ""1 (8 oz.) pkg. cream cheese, cubed""]","[""In a slow cooker, combine all ingredients."", ""Cover and cook on low for 4 hours.""]",www.cookbooks.com/Recipe-Details.aspx?id=10570,Gathered,"[""frozen corn"", ""cream cheese""]"
3,Chicken Funny,"[""1 large whole chicken"", ""2 (10 1/2 oz.) cans chicken gravy""]","[""Boil and debone chicken."", ""Put bite size pieces in average size square casserole dish.""]",www.cookbooks.com/Recipe-Details.aspx?id=897570,Gathered,"[""chicken"", ""chicken gravy""]"
4,Reeses Cups(Candy),"[""1 c. peanut butter"", ""3/4 c. graham cracker crumbs"", ""1 c. melted butter""]","[""Combine first four ingredients and press in 13 x 9-inch ungreased pan."", ""Melt chocolate chips and spread over mixture.""]",www.cookbooks.com/Recipe-Details.aspx?id=659239,Gathered,"[""peanut butter"", ""graham cracker crumbs"", ""butter""]"
"#;

const EXTRA_ROW: &str = r#"5,Cheeseburger Potato Soup,"[""6 baking potatoes"", ""1 lb. of extra lean ground beef""]","[""Wash potatoes."", ""Brown beef.""]",www.cookbooks.com/Recipe-Details.aspx?id=20115,Gathered,"[""baking potatoes"", ""extra lean ground beef""]"
"#;

fn write_corpus(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("full_dataset.csv");
    std::fs::write(&path, content).unwrap();
    path
}

fn options(chunk_size: usize) -> BuildOptions {
    BuildOptions {
        chunk_size,
        batch_size: 2,
        parallel_batches: 3,
        verify_fingerprint: true,
    }
}

fn all_rows(store: &VectorStore) -> Vec<Vec<f32>> {
    (0..store.rows())
        .map(|r| store.row_vector(r).unwrap())
        .collect()
}

/// Dense provider that counts how many texts it embedded.
struct CountingEmbedding {
    inner: LocalEmbedding,
    calls: AtomicUsize,
}

impl CountingEmbedding {
    fn new(dimension: usize) -> Self {
        Self {
            inner: LocalEmbedding::new(dimension),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedding {
    async fn embed(&self, text: &str) -> TastyResult<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> String {
        self.inner.model_id()
    }
}

/// Provider whose vectors have the wrong length.
struct BrokenEmbedding;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedding {
    async fn embed(&self, _text: &str) -> TastyResult<Vec<f32>> {
        Ok(vec![1.0; 3])
    }

    fn dimension(&self) -> usize {
        4
    }

    fn model_id(&self) -> String {
        "broken".into()
    }
}

// ---------------------------------------------------------------------------
// 1. Idempotent cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dense_cache_hit_is_identical_and_skips_embedding() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let provider = Arc::new(CountingEmbedding::new(48));
    let builder = VectorStoreBuilder::dense(provider.clone()).with_options(options(2));

    let first = builder.build_or_load(&corpus).await.unwrap();
    assert_eq!(first.rows(), 5);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 5);

    let second = builder.build_or_load(&corpus).await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 5, "cache hit must not re-embed");

    for (a, b) in all_rows(&first).iter().zip(all_rows(&second).iter()) {
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}

#[tokio::test]
async fn sparse_cache_hit_is_exactly_equal() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let builder = VectorStoreBuilder::sparse().with_options(options(2));

    let first = builder.build_or_load(&corpus).await.unwrap();
    let second = builder.build_or_load(&corpus).await.unwrap();
    assert_eq!(all_rows(&first), all_rows(&second));
    assert_eq!(first.space(), second.space());
    assert_eq!(second.metadata().num_rows, 5);
}

// ---------------------------------------------------------------------------
// 2. Chunking does not change the result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chunk_size_does_not_change_rows() {
    let one = TempDir::new().unwrap();
    let many = TempDir::new().unwrap();
    let corpus_one = write_corpus(&one, CORPUS);
    let corpus_many = write_corpus(&many, CORPUS);

    let by_one = VectorStoreBuilder::sparse()
        .with_options(options(1))
        .build_or_load(&corpus_one)
        .await
        .unwrap();
    let all_at_once = VectorStoreBuilder::sparse()
        .with_options(options(1000))
        .build_or_load(&corpus_many)
        .await
        .unwrap();
    assert_eq!(all_rows(&by_one), all_rows(&all_at_once));
}

#[tokio::test]
async fn parallel_batches_preserve_row_order() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let provider = LocalEmbedding::new(24);
    let store = VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(24)))
        .with_options(options(5))
        .build_or_load(&corpus)
        .await
        .unwrap();

    let catalog = RecipeCatalog::load(&corpus).unwrap();
    for row in 0..catalog.len() {
        let record = catalog.get(row).unwrap();
        let expected = provider.embed(&features::extract(record)).await.unwrap();
        assert_eq!(store.row_vector(row).unwrap(), expected, "row {row}");
    }
}

// ---------------------------------------------------------------------------
// 3. Corpus format errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_column_is_fatal_and_descriptive() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, "title,ingredients,NER\nToast,[],[]\n");
    let err = VectorStoreBuilder::sparse()
        .build_or_load(&corpus)
        .await
        .unwrap_err();
    assert!(matches!(err, TastyError::CorpusFormat { .. }));
    let message = err.to_string();
    assert!(message.contains("'directions'"), "{message}");
    assert!(message.contains("full_dataset.csv"), "{message}");
}

#[tokio::test]
async fn missing_corpus_file_is_corpus_error() {
    let tmp = TempDir::new().unwrap();
    let corpus = tmp.path().join("absent.csv");
    let err = VectorStoreBuilder::sparse()
        .build_or_load(&corpus)
        .await
        .unwrap_err();
    assert!(matches!(err, TastyError::CorpusFormat { .. }));
}

#[test]
fn corpus_reader_ignores_extra_columns() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let mut reader = CorpusReader::open(&corpus, 10).unwrap();
    let rows = reader.next_chunk().unwrap().unwrap();
    assert_eq!(rows[3].title, "Chicken Funny");
    assert_eq!(rows[3].named_entities, vec!["chicken", "chicken gravy"]);
}

// ---------------------------------------------------------------------------
// 4. Strategy and space mismatches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn switching_strategy_requires_rebuild() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let dense = VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(16)));
    let sparse = VectorStoreBuilder::sparse();

    dense.build_or_load(&corpus).await.unwrap();
    let err = sparse.build_or_load(&corpus).await.unwrap_err();
    assert!(matches!(err, TastyError::EmbeddingSpaceMismatch { .. }));

    let rebuilt = sparse.rebuild(&corpus).await.unwrap();
    assert_eq!(rebuilt.strategy(), EmbeddingStrategy::Sparse);

    let err = dense.build_or_load(&corpus).await.unwrap_err();
    assert!(matches!(err, TastyError::EmbeddingSpaceMismatch { .. }));
}

#[tokio::test]
async fn different_dense_model_is_space_mismatch() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(16)))
        .build_or_load(&corpus)
        .await
        .unwrap();

    let err = VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(32)))
        .build_or_load(&corpus)
        .await
        .unwrap_err();
    assert!(matches!(err, TastyError::EmbeddingSpaceMismatch { .. }));
}

#[tokio::test]
async fn provider_with_wrong_width_fails_build() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let err = VectorStoreBuilder::dense(Arc::new(BrokenEmbedding))
        .build_or_load(&corpus)
        .await
        .unwrap_err();
    assert!(matches!(err, TastyError::Embedding(_)));
}

// ---------------------------------------------------------------------------
// 5. Staleness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn changed_corpus_triggers_rebuild() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let builder = VectorStoreBuilder::sparse();
    let before = builder.build_or_load(&corpus).await.unwrap();
    assert_eq!(before.rows(), 5);

    std::fs::write(&corpus, format!("{CORPUS}{EXTRA_ROW}")).unwrap();
    let after = builder.build_or_load(&corpus).await.unwrap();
    assert_eq!(after.rows(), 6);
    assert_ne!(
        before.metadata().corpus_fingerprint,
        after.metadata().corpus_fingerprint
    );
}

#[tokio::test]
async fn unverified_cache_is_trusted() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let builder = VectorStoreBuilder::sparse().with_options(BuildOptions {
        verify_fingerprint: false,
        ..BuildOptions::default()
    });
    builder.build_or_load(&corpus).await.unwrap();

    std::fs::write(&corpus, format!("{CORPUS}{EXTRA_ROW}")).unwrap();
    let stale = builder.build_or_load(&corpus).await.unwrap();
    assert_eq!(stale.rows(), 5);
}

// ---------------------------------------------------------------------------
// 6. Corruption
// ---------------------------------------------------------------------------

fn truncate(path: &Path, by: usize) {
    let bytes = std::fs::read(path).unwrap();
    std::fs::write(path, &bytes[..bytes.len() - by]).unwrap();
}

#[tokio::test]
async fn truncated_dense_matrix_is_corruption() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let builder = VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(16)));
    let store = builder.build_or_load(&corpus).await.unwrap();
    let matrix = store.paths().dense_matrix.clone();
    drop(store);

    truncate(&matrix, 4);
    let err = builder.build_or_load(&corpus).await.unwrap_err();
    assert!(err.is_cache_corruption());
    assert!(err.to_string().contains("rebuild"));
}

#[tokio::test]
async fn missing_vocabulary_is_corruption() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let builder = VectorStoreBuilder::sparse();
    let store = builder.build_or_load(&corpus).await.unwrap();
    std::fs::remove_file(&store.paths().vocabulary).unwrap();
    drop(store);

    let err = builder.build_or_load(&corpus).await.unwrap_err();
    assert!(err.is_cache_corruption());
}

#[tokio::test]
async fn metadata_row_count_disagreement_is_corruption() {
    let tmp = TempDir::new().unwrap();
    let corpus = write_corpus(&tmp, CORPUS);
    let builder = VectorStoreBuilder::sparse();
    let store = builder.build_or_load(&corpus).await.unwrap();
    let metadata_path = store.paths().metadata.clone();
    drop(store);

    let mut metadata: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&metadata_path).unwrap()).unwrap();
    metadata["num_rows"] = serde_json::json!(7);
    std::fs::write(&metadata_path, serde_json::to_vec(&metadata).unwrap()).unwrap();

    let err = builder.build_or_load(&corpus).await.unwrap_err();
    assert!(err.is_cache_corruption());
}
