use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tastyai_core::{Language, RankedCandidate, RecipeRecord, TastyResult, UserPreferences};
use tastyai_memory::{RecipeCatalog, VectorStore, VectorStoreBuilder};
use tracing::{info, warn};

use crate::collaborators::{image_prompt, ImageGenerator, PassThroughTranslator, Translator};
use crate::filter;
use crate::ranker::Ranker;

/// Separator used to translate a whole list in one call.
const LIST_SEPARATOR: &str = " | ";

/// Outcome of illustrating a recommendation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "url")]
pub enum RecipeImage {
    /// No image generator is configured.
    #[default]
    NotRequested,
    /// URL returned by the generator.
    Generated(String),
    /// The generator returned nothing or failed.
    Unavailable,
}

impl RecipeImage {
    /// URL of the generated image, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Generated(url) => Some(url),
            Self::NotRequested | Self::Unavailable => None,
        }
    }
}

/// A filtered recipe with its display fields attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// The recipe as stored in the corpus.
    pub recipe: RecipeRecord,
    /// Title in the requester's language.
    pub translated_title: String,
    /// Ingredients in the requester's language.
    pub translated_ingredients: Vec<String>,
    /// Directions in the requester's language.
    pub translated_directions: Vec<String>,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Rank assigned before filtering.
    pub rank: usize,
    /// Row of the recipe in the corpus.
    pub row: usize,
    /// Illustration, when an image generator is configured.
    #[serde(default)]
    pub image: RecipeImage,
}

/// Composes ranking, filtering and translation into one request.
///
/// The store and catalog are shared read-only; the recommender itself holds
/// no per-request state.
pub struct Recommender {
    store: Arc<VectorStore>,
    catalog: Arc<RecipeCatalog>,
    ranker: Ranker,
    translator: Arc<dyn Translator>,
    image_generator: Option<Arc<dyn ImageGenerator>>,
}

impl Recommender {
    /// Recommender with the default ranker, no translation and no images.
    pub fn new(store: Arc<VectorStore>, catalog: Arc<RecipeCatalog>) -> Self {
        Self {
            store,
            catalog,
            ranker: Ranker::default(),
            translator: Arc::new(PassThroughTranslator),
            image_generator: None,
        }
    }

    /// Build or load the store for `corpus` and read its recipe table.
    pub async fn open(builder: &VectorStoreBuilder, corpus: &Path) -> TastyResult<Self> {
        let store = builder.build_or_load(corpus).await?;
        let catalog = RecipeCatalog::load(corpus)?;
        Ok(Self::new(Arc::new(store), Arc::new(catalog)))
    }

    /// Replace the ranker.
    pub fn with_ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = ranker;
        self
    }

    /// Translator used for non-English requests.
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }

    /// Illustrate every returned recipe with `generator`.
    pub fn with_image_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.image_generator = Some(generator);
        self
    }

    /// The shared vector store.
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// The shared recipe table.
    pub fn catalog(&self) -> &RecipeCatalog {
        &self.catalog
    }

    /// Rank exactly `top_n` candidates for `preferences`, drop those breaking
    /// a hard constraint and attach display fields.
    ///
    /// Fewer than `top_n` results come back when candidates are filtered out.
    /// Requests not flagged as recipe requests yield no recommendations.
    pub async fn recommend(
        &self,
        preferences: &UserPreferences,
        top_n: usize,
    ) -> TastyResult<Vec<Recommendation>> {
        if !preferences.is_recipe_request {
            info!("Not a recipe request, skipping recommendation");
            return Ok(Vec::new());
        }

        let query = preferences.query_text();
        let ranked = self
            .ranker
            .rank(&query, &self.store, &self.catalog, top_n)
            .await?;
        let ranked_count = ranked.len();
        let survivors = filter::filter(ranked, preferences);
        if survivors.len() < ranked_count {
            warn!(
                requested = top_n,
                ranked = ranked_count,
                returned = survivors.len(),
                "Filtering reduced the recommendation count"
            );
        }

        let mut out = Vec::with_capacity(survivors.len());
        for candidate in survivors {
            let mut recommendation = self.localize(candidate, preferences.language).await?;
            recommendation.image = self.illustrate(&recommendation).await;
            out.push(recommendation);
        }
        info!(query = %query, returned = out.len(), language = %preferences.language, "Recommendations ready");
        Ok(out)
    }

    /// Attach translated fields. English is passed through without calls.
    pub async fn localize(
        &self,
        candidate: RankedCandidate,
        language: Language,
    ) -> TastyResult<Recommendation> {
        let RankedCandidate {
            recipe,
            score,
            rank,
            row,
        } = candidate;

        let (translated_title, translated_ingredients, translated_directions) =
            if language == Language::English {
                (
                    recipe.title.clone(),
                    recipe.ingredients.clone(),
                    recipe.directions.clone(),
                )
            } else {
                tokio::try_join!(
                    self.translator.translate(&recipe.title, language),
                    self.translate_list(&recipe.ingredients, language),
                    self.translate_list(&recipe.directions, language),
                )?
            };

        Ok(Recommendation {
            recipe,
            translated_title,
            translated_ingredients,
            translated_directions,
            score,
            rank,
            row,
            image: RecipeImage::NotRequested,
        })
    }

    /// Ask the image generator for a picture of a localized recipe. A failed
    /// call is logged and reported as [`RecipeImage::Unavailable`].
    pub async fn illustrate(&self, recommendation: &Recommendation) -> RecipeImage {
        let Some(generator) = &self.image_generator else {
            return RecipeImage::NotRequested;
        };
        let title = &recommendation.translated_title;
        let prompt = image_prompt(title, &recommendation.translated_ingredients);
        match generator.generate(&prompt).await {
            Ok(Some(url)) => RecipeImage::Generated(url),
            Ok(None) => {
                warn!(title = %title, "Image generator returned no image");
                RecipeImage::Unavailable
            }
            Err(e) => {
                warn!(title = %title, error = %e, "Image generation failed");
                RecipeImage::Unavailable
            }
        }
    }

    /// Translate a list in a single call by joining and re-splitting it.
    async fn translate_list(&self, items: &[String], language: Language) -> TastyResult<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let joined = items.join(LIST_SEPARATOR);
        let translated = self.translator.translate(&joined, language).await?;
        Ok(translated
            .split(LIST_SEPARATOR)
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tastyai_memory::LocalEmbedding;

    struct UpperTranslator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for UpperTranslator {
        async fn translate(&self, text: &str, _target: Language) -> TastyResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_uppercase())
        }
    }

    async fn recommender(dir: &Path) -> Recommender {
        let corpus = dir.join("recipes.csv");
        std::fs::write(
            &corpus,
            "title,ingredients,directions,NER\n\
             Pancakes,\"['flour', 'milk']\",\"['Mix.', 'Fry.']\",\"['flour', 'milk']\"\n\
             Toast,[],[],\"['bread']\"\n",
        )
        .unwrap();
        let builder = VectorStoreBuilder::dense(Arc::new(LocalEmbedding::new(16)));
        Recommender::open(&builder, &corpus).await.unwrap()
    }

    fn candidate(rec: &Recommender, row: usize) -> RankedCandidate {
        RankedCandidate {
            recipe: rec.catalog().get(row).unwrap().clone(),
            score: 0.5,
            rank: 1,
            row,
        }
    }

    #[tokio::test]
    async fn test_english_is_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let translator = Arc::new(UpperTranslator {
            calls: AtomicUsize::new(0),
        });
        let rec = recommender(dir.path()).await.with_translator(translator.clone());
        let out = rec.localize(candidate(&rec, 0), Language::English).await.unwrap();
        assert_eq!(out.translated_title, "Pancakes");
        assert_eq!(out.translated_ingredients, vec!["flour", "milk"]);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lists_translated_in_one_call_each() {
        let dir = tempfile::tempdir().unwrap();
        let translator = Arc::new(UpperTranslator {
            calls: AtomicUsize::new(0),
        });
        let rec = recommender(dir.path()).await.with_translator(translator.clone());
        let out = rec.localize(candidate(&rec, 0), Language::Spanish).await.unwrap();
        assert_eq!(out.translated_title, "PANCAKES");
        assert_eq!(out.translated_ingredients, vec!["FLOUR", "MILK"]);
        assert_eq!(out.translated_directions, vec!["MIX.", "FRY."]);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 3);
        assert_eq!(out.recipe.title, "Pancakes");
    }

    #[tokio::test]
    async fn test_empty_lists_skip_translation() {
        let dir = tempfile::tempdir().unwrap();
        let translator = Arc::new(UpperTranslator {
            calls: AtomicUsize::new(0),
        });
        let rec = recommender(dir.path()).await.with_translator(translator.clone());
        let out = rec.localize(candidate(&rec, 1), Language::Portuguese).await.unwrap();
        assert!(out.translated_ingredients.is_empty());
        assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_recipe_request_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rec = recommender(dir.path()).await;
        let prefs = UserPreferences::default().with_included(["flour"]);
        assert!(rec.recommend(&prefs, 3).await.unwrap().is_empty());
    }
}
