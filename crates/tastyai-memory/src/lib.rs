//! Recipe vectorization and the persisted vector cache.
//!
//! Turns a recipe corpus into a matrix of embedding rows with one of two
//! strategies, persists it next to the corpus, and reloads it on later runs
//! without recomputation.
//!
//! # Main types
//!
//! - [`VectorStoreBuilder`]: Builds or reloads a [`VectorStore`] for a corpus file.
//! - [`VectorStore`]: Immutable matrix plus the model needed to embed queries into it.
//! - [`EmbeddingProvider`]: Trait for dense embedding models, injected into the builder.
//! - [`LocalEmbedding`]: Hashed bag-of-words dense embedder requiring no fitting.
//! - `FastEmbedProvider`: all-MiniLM-L6-v2 sentence embeddings (feature `fastembed`).
//! - [`TfidfModel`]: Corpus-fitted TF-IDF vocabulary for the sparse strategy.
//! - [`CorpusReader`] / [`RecipeCatalog`]: Chunked and materialized corpus access.

/// Corpus streaming, the recipe table and corpus fingerprints.
pub mod corpus;
/// Embedding provider trait, embedding spaces and the local dense implementation.
pub mod embedding;
/// One feature string per recipe.
pub mod features;
/// Binary matrix format, chunk commits and the memory-mapped reader.
pub mod matrix;
/// Pretrained sentence embeddings backed by fastembed.
#[cfg(feature = "fastembed")]
pub mod pretrained;
/// Vector store, cache metadata and the build-or-load entry point.
pub mod store;
/// TF-IDF fitting and transformation.
pub mod tfidf;

pub use corpus::{corpus_fingerprint, CorpusReader, RecipeCatalog};
pub use embedding::{EmbeddingProvider, EmbeddingSpace, EmbeddingStrategy, LocalEmbedding};
pub use matrix::MappedMatrix;
#[cfg(feature = "fastembed")]
pub use pretrained::FastEmbedProvider;
pub use store::{
    BuildOptions, CacheMetadata, CachePaths, EmbeddedQuery, QueryVector, VectorStore,
    VectorStoreBuilder,
};
pub use tfidf::{SparseVector, TfidfFitter, TfidfModel};
