//! Hard preference constraints applied after ranking.

use std::fmt;

use tastyai_core::{RankedCandidate, RecipeRecord, SugarPolicy, UserPreferences};
use tracing::debug;

/// Why a candidate was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// An ingredient equals one of the excluded ingredients.
    ExcludedIngredient(String),
    /// Sugar-free was requested and an ingredient mentions sugar.
    ContainsSugar(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::ExcludedIngredient(i) => write!(f, "excluded ingredient '{i}'"),
            Violation::ContainsSugar(i) => write!(f, "sugar in '{i}'"),
        }
    }
}

/// First hard constraint `recipe` breaks, if any.
///
/// Exclusion is exact, case-sensitive equality with an ingredient entry.
/// The sugar check is a case-insensitive substring match on "sugar".
pub fn violation(recipe: &RecipeRecord, preferences: &UserPreferences) -> Option<Violation> {
    if let Some(hit) = recipe
        .ingredients
        .iter()
        .find(|i| preferences.excluded_ingredients.contains(i.as_str()))
    {
        return Some(Violation::ExcludedIngredient(hit.clone()));
    }
    if preferences.sugar_policy == SugarPolicy::SugarFree {
        if let Some(hit) = recipe
            .ingredients
            .iter()
            .find(|i| i.to_lowercase().contains("sugar"))
        {
            return Some(Violation::ContainsSugar(hit.clone()));
        }
    }
    None
}

/// Drop candidates that break a hard constraint, keeping survivors in rank order.
///
/// Dietary terms and sharing are never enforced. Nothing is backfilled, so the
/// result may be shorter than the input.
pub fn filter(
    candidates: Vec<RankedCandidate>,
    preferences: &UserPreferences,
) -> Vec<RankedCandidate> {
    candidates
        .into_iter()
        .filter(|candidate| match violation(&candidate.recipe, preferences) {
            Some(reason) => {
                debug!(
                    title = %candidate.recipe.title,
                    rank = candidate.rank,
                    reason = %reason,
                    "Dropped candidate"
                );
                false
            }
            None => true,
        })
        .collect()
}
