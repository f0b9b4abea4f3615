//! Similarity ranking, preference filtering and the recommendation pipeline.
//!
//! # Main types
//!
//! - [`Ranker`]: Scores every recipe against a query and keeps the top `n`.
//! - [`filter()`]: Drops candidates that break a hard preference constraint.
//! - [`Recommender`]: Ranks, filters and localizes recipes for one request.
//! - [`Translator`], [`PreferenceExtractor`], [`LanguageDetector`], [`ImageGenerator`]:
//!   External capabilities consumed around the pipeline.

/// Traits for the external capabilities and their built-in implementations.
pub mod collaborators;
/// Hard preference filters.
pub mod filter;
/// The recommendation pipeline.
pub mod orchestrator;
/// Markdown rendering.
pub mod presentation;
/// Cosine ranking with top-k selection and tie-breaking.
pub mod ranker;

pub use collaborators::{
    image_prompt, understand_request, ImageGenerator, LanguageDetector, PassThroughTranslator,
    PreferenceExtractor, Translator,
};
pub use filter::{filter, violation, Violation};
pub use orchestrator::{RecipeImage, Recommendation, Recommender};
pub use presentation::{ask_for_recipe, render_markdown, render_response};
pub use ranker::{Ranker, RankerOptions, TieBreak};
