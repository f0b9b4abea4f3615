use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TastyError, TastyResult};

/// How much sugar the user wants in a recipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SugarPolicy {
    /// Prefer recipes with little sugar.
    Low,
    /// No preference.
    #[default]
    Normal,
    /// Sweet recipes welcome.
    High,
    /// Hard filter: recipes with any sugar ingredient are dropped.
    SugarFree,
}

impl SugarPolicy {
    /// The token used in query text and serialized preferences.
    pub fn as_str(&self) -> &'static str {
        match self {
            SugarPolicy::Low => "low",
            SugarPolicy::Normal => "normal",
            SugarPolicy::High => "high",
            SugarPolicy::SugarFree => "sugar_free",
        }
    }
}

impl fmt::Display for SugarPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SugarPolicy {
    type Err = TastyError;

    fn from_str(s: &str) -> TastyResult<Self> {
        match s.trim() {
            "low" => Ok(SugarPolicy::Low),
            "normal" => Ok(SugarPolicy::Normal),
            "high" => Ok(SugarPolicy::High),
            "sugar_free" => Ok(SugarPolicy::SugarFree),
            other => Err(TastyError::PreferenceValidation(format!(
                "invalid sugar policy '{other}': choose from 'low', 'normal', 'high', or 'sugar_free'"
            ))),
        }
    }
}

impl TryFrom<String> for SugarPolicy {
    type Error = TastyError;

    fn try_from(value: String) -> TastyResult<Self> {
        value.parse()
    }
}

impl From<SugarPolicy> for String {
    fn from(policy: SugarPolicy) -> Self {
        policy.as_str().to_string()
    }
}

/// Languages the recommendations can be presented in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English, the corpus language.
    #[default]
    English,
    /// Spanish.
    Spanish,
    /// Portuguese.
    Portuguese,
}

impl Language {
    /// Map a detected ISO 639-1 code to a supported language.
    ///
    /// Anything other than `es` or `pt` is treated as English.
    pub fn from_iso_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "es" => Language::Spanish,
            "pt" => Language::Portuguese,
            _ => Language::English,
        }
    }

    /// Lowercase language name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Spanish => "spanish",
            Language::Portuguese => "portuguese",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = TastyError;

    fn from_str(s: &str) -> TastyResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "spanish" | "es" => Ok(Language::Spanish),
            "portuguese" | "pt" => Ok(Language::Portuguese),
            other => Err(TastyError::PreferenceValidation(format!(
                "unsupported language '{other}'"
            ))),
        }
    }
}

/// Preferences as returned by the extraction collaborator, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractedPreferences {
    /// Free-form dietary terms such as "vegan".
    #[serde(default)]
    pub dietary: Vec<String>,
    /// Raw sugar policy string, validated later.
    #[serde(default = "default_sugar_content")]
    pub sugar_content: String,
    /// Whether the meal is meant for sharing.
    #[serde(default)]
    pub sharing: bool,
    /// Ingredients the user asked for.
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Ingredients the user refuses.
    #[serde(default)]
    pub excluded_ingredients: Vec<String>,
    /// Whether the text asked for a recipe at all.
    #[serde(default)]
    pub is_recipe_request: bool,
}

fn default_sugar_content() -> String {
    SugarPolicy::Normal.as_str().to_string()
}

/// Validated, immutable preferences for one recommendation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Dietary terms, part of the ranking query.
    pub dietary: BTreeSet<String>,
    /// Sugar handling; `SugarFree` is a hard filter.
    pub sugar_policy: SugarPolicy,
    /// Informational only; never enforced as a filter.
    pub sharing: bool,
    /// Ingredients the user asked for, part of the ranking query.
    pub included_ingredients: BTreeSet<String>,
    /// Ingredients no returned recipe may contain.
    pub excluded_ingredients: BTreeSet<String>,
    /// Language the reply is rendered in.
    pub language: Language,
    /// Requests not asking for a recipe get no recommendations.
    pub is_recipe_request: bool,
}

impl UserPreferences {
    /// Validate extracted preferences. An unknown sugar policy is rejected.
    pub fn from_extracted(raw: ExtractedPreferences, language: Language) -> TastyResult<Self> {
        let sugar_policy = raw.sugar_content.parse()?;
        Ok(Self {
            dietary: raw.dietary.into_iter().collect(),
            sugar_policy,
            sharing: raw.sharing,
            included_ingredients: raw.ingredients.into_iter().collect(),
            excluded_ingredients: raw.excluded_ingredients.into_iter().collect(),
            language,
            is_recipe_request: raw.is_recipe_request,
        })
    }

    /// Parse and validate the JSON object produced by the extraction collaborator.
    pub fn from_extracted_json(json: &str, language: Language) -> TastyResult<Self> {
        let raw: ExtractedPreferences = serde_json::from_str(json).map_err(|e| {
            TastyError::PreferenceValidation(format!("malformed preference object: {e}"))
        })?;
        Self::from_extracted(raw, language)
    }

    /// Text embedded for similarity ranking: dietary terms, included
    /// ingredients and the sugar policy token.
    pub fn query_text(&self) -> String {
        self.dietary
            .iter()
            .chain(self.included_ingredients.iter())
            .map(String::as_str)
            .chain(std::iter::once(self.sugar_policy.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Replace the sugar policy.
    pub fn with_sugar_policy(mut self, policy: SugarPolicy) -> Self {
        self.sugar_policy = policy;
        self
    }

    /// Add ingredients to exclude.
    pub fn with_excluded<I, S>(mut self, ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_ingredients
            .extend(ingredients.into_iter().map(Into::into));
        self
    }

    /// Add ingredients to look for.
    pub fn with_included<I, S>(mut self, ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.included_ingredients
            .extend(ingredients.into_iter().map(Into::into));
        self
    }

    /// Set the reply language.
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Mark the request as asking for a recipe.
    pub fn recipe_request(mut self) -> Self {
        self.is_recipe_request = true;
        self
    }
}

impl fmt::Display for UserPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dietary: {:?}, Sugar: {}, Sharing: {}, Preferred Ingredients: {:?}, Excluded: {:?}, \
             Language: {}, Is Recipe Request: {}",
            self.dietary,
            self.sugar_policy,
            self.sharing,
            self.included_ingredients,
            self.excluded_ingredients,
            self.language,
            self.is_recipe_request
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sugar_policy_parse() {
        assert_eq!("low".parse::<SugarPolicy>().unwrap(), SugarPolicy::Low);
        assert_eq!(
            "sugar_free".parse::<SugarPolicy>().unwrap(),
            SugarPolicy::SugarFree
        );
        assert!("extra_sweet".parse::<SugarPolicy>().is_err());
    }

    #[test]
    fn test_invalid_sugar_policy_rejects_construction() {
        let json = r#"{"sugar_content": "extra_sweet", "is_recipe_request": true}"#;
        let err = UserPreferences::from_extracted_json(json, Language::English).unwrap_err();
        assert!(matches!(err, TastyError::PreferenceValidation(_)));
        assert!(err.to_string().contains("extra_sweet"));
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let prefs = UserPreferences::from_extracted_json("{}", Language::Spanish).unwrap();
        assert_eq!(prefs.sugar_policy, SugarPolicy::Normal);
        assert!(!prefs.sharing);
        assert!(!prefs.is_recipe_request);
        assert!(prefs.dietary.is_empty());
        assert_eq!(prefs.language, Language::Spanish);
    }

    #[test]
    fn test_full_extraction() {
        let json = r#"{
            "dietary": ["vegetarian"],
            "sugar_content": "low",
            "sharing": true,
            "ingredients": ["tomato", "basil"],
            "excluded_ingredients": ["peanuts"],
            "is_recipe_request": true
        }"#;
        let prefs = UserPreferences::from_extracted_json(json, Language::English).unwrap();
        assert_eq!(prefs.sugar_policy, SugarPolicy::Low);
        assert!(prefs.sharing);
        assert!(prefs.excluded_ingredients.contains("peanuts"));
        assert_eq!(prefs.query_text(), "vegetarian basil tomato low");
    }

    #[test]
    fn test_query_text_without_terms_is_policy_only() {
        let prefs = UserPreferences::default().with_sugar_policy(SugarPolicy::SugarFree);
        assert_eq!(prefs.query_text(), "sugar_free");
    }

    #[test]
    fn test_deserialize_validates_policy() {
        let bad = r#"{"dietary":[],"sugar_policy":"extra_sweet","sharing":false,
            "included_ingredients":[],"excluded_ingredients":[],"language":"english",
            "is_recipe_request":true}"#;
        assert!(serde_json::from_str::<UserPreferences>(bad).is_err());

        let prefs = UserPreferences::default().with_sugar_policy(SugarPolicy::High);
        let json = serde_json::to_string(&prefs).unwrap();
        assert!(json.contains("\"high\""));
        let back: UserPreferences = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prefs);
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::from_iso_code("es"), Language::Spanish);
        assert_eq!(Language::from_iso_code("PT"), Language::Portuguese);
        assert_eq!(Language::from_iso_code("fr"), Language::English);
        assert_eq!("portuguese".parse::<Language>().unwrap(), Language::Portuguese);
        assert!("klingon".parse::<Language>().is_err());
    }
}
