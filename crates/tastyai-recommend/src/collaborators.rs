//! Capabilities consumed around the core pipeline.
//!
//! Preference extraction, language detection, translation and image
//! generation live outside this workspace; the pipeline only sees these
//! traits.

use async_trait::async_trait;
use tastyai_core::{ExtractedPreferences, Language, TastyResult, UserPreferences};
use tracing::info;

/// Turns free text into the raw preference object.
#[async_trait]
pub trait PreferenceExtractor: Send + Sync {
    /// Extract preferences from English text. Validation happens in
    /// [`UserPreferences::from_extracted`], not here.
    async fn extract(&self, text: &str) -> TastyResult<ExtractedPreferences>;
}

/// Translates text into a target language.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target`.
    async fn translate(&self, text: &str, target: Language) -> TastyResult<String>;
}

/// Detects the language a request was written in.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// ISO 639-1 code of `text`, e.g. `"es"`.
    async fn detect_code(&self, text: &str) -> TastyResult<String>;

    /// Supported language of `text`. Unsupported codes fall back to English.
    async fn detect(&self, text: &str) -> TastyResult<Language> {
        let code = self.detect_code(text).await?;
        let language = Language::from_iso_code(&code);
        info!(code = %code, language = %language, "Detected language");
        Ok(language)
    }
}

/// Produces an illustration for a recipe.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// URL of an image generated from `prompt`, or `None` when the service
    /// produced nothing.
    async fn generate(&self, prompt: &str) -> TastyResult<Option<String>>;
}

/// Translator that returns its input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughTranslator;

#[async_trait]
impl Translator for PassThroughTranslator {
    async fn translate(&self, text: &str, _target: Language) -> TastyResult<String> {
        Ok(text.to_string())
    }
}

/// Prompt sent to an image generator for a recipe.
pub fn image_prompt(title: &str, ingredients: &[String]) -> String {
    format!(
        "A beautiful photo of {title} with ingredients: {}.",
        ingredients.join(", ")
    )
}

/// Detect the language of `text`, translate it to English when needed,
/// extract preferences and validate them.
///
/// An invalid sugar policy from the extractor is rejected here, before any
/// ranking work starts.
pub async fn understand_request(
    text: &str,
    detector: &dyn LanguageDetector,
    translator: &dyn Translator,
    extractor: &dyn PreferenceExtractor,
) -> TastyResult<UserPreferences> {
    let language = detector.detect(text).await?;
    let english = if language == Language::English {
        text.to_string()
    } else {
        translator.translate(text, Language::English).await?
    };
    let raw = extractor.extract(&english).await?;
    UserPreferences::from_extracted(raw, language)
}
