mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tastyai_core::{Language, UserPreferences};
use tastyai_memory::{
    matrix, CacheMetadata, CachePaths, EmbeddingProvider, EmbeddingStrategy, LocalEmbedding,
    VectorStoreBuilder,
};
use tastyai_recommend::{render_response, Ranker, Recommender};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{DenseModel, TastyConfig, VectorizerConfig};

#[derive(Parser)]
#[command(name = "tastyai", about = "TastyAI: recipe recommendations by vector similarity")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "tastyai.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector cache, or confirm it is up to date
    Vectorize {
        /// Corpus CSV (overrides config)
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Embedding strategy: dense or sparse (overrides config)
        #[arg(long)]
        strategy: Option<EmbeddingStrategy>,
        /// Rebuild even if a valid cache exists
        #[arg(long)]
        force: bool,
    },
    /// Recommend recipes for an extracted-preferences JSON file
    Recommend {
        /// JSON object with dietary, sugar_content, ingredients, ...
        #[arg(long)]
        preferences: PathBuf,
        /// Number of candidates to rank (overrides config)
        #[arg(long)]
        top_n: Option<usize>,
        /// Output language
        #[arg(long, default_value = "english")]
        language: Language,
        /// Corpus CSV (overrides config)
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Print JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// Print the metadata of the persisted cache
    Inspect {
        /// Corpus CSV (overrides config)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn dense_provider(config: &VectorizerConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.model {
        DenseModel::Local => Ok(Arc::new(LocalEmbedding::new(config.embedding_dimension))),
        #[cfg(feature = "fastembed")]
        DenseModel::AllMiniLmL6V2 => Ok(Arc::new(
            tastyai_memory::FastEmbedProvider::all_minilm_l6_v2(config.model_cache_dir.clone())?,
        )),
        #[cfg(not(feature = "fastembed"))]
        DenseModel::AllMiniLmL6V2 => Err(anyhow::anyhow!(
            "model 'all-minilm-l6-v2' needs a build with the 'fastembed' feature"
        )),
    }
}

fn store_builder(
    config: &VectorizerConfig,
    strategy: EmbeddingStrategy,
) -> anyhow::Result<VectorStoreBuilder> {
    let builder = match strategy {
        EmbeddingStrategy::Dense => VectorStoreBuilder::dense(dense_provider(config)?),
        EmbeddingStrategy::Sparse => VectorStoreBuilder::sparse(),
    };
    Ok(builder.with_options(config.build_options()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    // The default config file is optional; an explicit one must exist.
    let allow_missing = cli.config == PathBuf::from("tastyai.toml");
    let config = TastyConfig::load(&cli.config, allow_missing)?;

    match cli.command {
        Commands::Vectorize {
            corpus,
            strategy,
            force,
        } => {
            let corpus = corpus.unwrap_or(config.corpus.path);
            let strategy = strategy.unwrap_or(config.vectorizer.strategy);
            let builder = store_builder(&config.vectorizer, strategy)?;
            info!(corpus = %corpus.display(), strategy = %strategy, force, "Vectorizing corpus");

            let store = if force {
                builder.rebuild(&corpus).await?
            } else {
                builder.build_or_load(&corpus).await?
            };
            let metadata = store.metadata();
            println!(
                "{} rows in {} (built {} in {:.2}s)",
                metadata.num_rows,
                store.space(),
                metadata.built_at.to_rfc3339(),
                metadata.time_taken_secs
            );
        }
        Commands::Recommend {
            preferences,
            top_n,
            language,
            corpus,
            json,
        } => {
            let corpus = corpus.unwrap_or(config.corpus.path);
            let raw = std::fs::read_to_string(&preferences).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read preferences '{}': {}",
                    preferences.display(),
                    e
                )
            })?;
            let prefs = UserPreferences::from_extracted_json(&raw, language)?;
            info!(preferences = %prefs, "Preferences loaded");
            if !prefs.is_recipe_request && !json {
                print!("{}", render_response(&prefs, &[]));
                return Ok(());
            }

            let builder = store_builder(&config.vectorizer, config.vectorizer.strategy)?;
            let recommender = Recommender::open(&builder, &corpus)
                .await?
                .with_ranker(Ranker::new(config.ranking.ranker_options()));
            let top_n = top_n.unwrap_or(config.ranking.default_top_n);
            let recommendations = recommender.recommend(&prefs, top_n).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&recommendations)?);
            } else {
                print!("{}", render_response(&prefs, &recommendations));
            }
        }
        Commands::Inspect { corpus } => {
            let corpus = corpus.unwrap_or(config.corpus.path);
            let paths = CachePaths::for_corpus(&corpus);
            let Some(metadata) = CacheMetadata::load(&paths.metadata)? else {
                println!("No vector cache next to {}", corpus.display());
                return Ok(());
            };
            println!("{}", serde_json::to_string_pretty(&metadata)?);

            let matrix_path = paths.matrix(metadata.space.strategy);
            let header = matrix::read_header(matrix_path)?;
            println!(
                "{}: {} rows x {} dims ({})",
                matrix_path.display(),
                header.rows,
                header.dimension,
                header.strategy
            );
            if header.rows != metadata.num_rows {
                warn!(
                    matrix_rows = header.rows,
                    metadata_rows = metadata.num_rows,
                    "Matrix and metadata disagree; run `tastyai vectorize --force`"
                );
            }
        }
    }

    Ok(())
}
