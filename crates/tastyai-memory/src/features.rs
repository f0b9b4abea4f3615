//! Feature extraction: one text string per recipe, used as embedding input.

use tastyai_core::RecipeRecord;

use crate::embedding::EmbeddingStrategy;

/// Combined feature string: title, named entities, then ingredients, space-joined.
pub fn extract(record: &RecipeRecord) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(
        1 + record.named_entities.len() + record.ingredients.len(),
    );
    parts.push(record.title.as_str());
    parts.extend(record.named_entities.iter().map(String::as_str));
    parts.extend(record.ingredients.iter().map(String::as_str));
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Named-entity tokens only, the input of the sparse strategy.
pub fn named_entity_text(record: &RecipeRecord) -> String {
    record
        .named_entities
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Feature string for the given strategy.
pub fn features_for(strategy: EmbeddingStrategy, record: &RecipeRecord) -> String {
    match strategy {
        EmbeddingStrategy::Dense => extract(record),
        EmbeddingStrategy::Sparse => named_entity_text(record),
    }
}
