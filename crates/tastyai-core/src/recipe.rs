use std::iter::Peekable;
use std::str::Chars;

use serde::{Deserialize, Serialize};

/// A single recipe row from the corpus.
///
/// List fields are always materialized as sequences: raw corpus text is run
/// through [`parse_list`] exactly once, in [`RecipeRecord::from_raw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeRecord {
    /// Recipe title, trimmed.
    pub title: String,
    /// Ingredient lines with quantities.
    pub ingredients: Vec<String>,
    /// Preparation steps in order.
    pub directions: Vec<String>,
    /// Bare ingredient names from the `NER` column.
    pub named_entities: Vec<String>,
}

impl RecipeRecord {
    /// Build a record from raw corpus fields, normalizing the list-encoded columns.
    pub fn from_raw(title: &str, ingredients: &str, directions: &str, named_entities: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            ingredients: parse_list(ingredients),
            directions: parse_list(directions),
            named_entities: parse_list(named_entities),
        }
    }
}

/// A recipe selected by the ranker for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// The ranked recipe.
    pub recipe: RecipeRecord,
    /// Cosine similarity to the query.
    pub score: f32,
    /// 1-based position in the ranking.
    pub rank: usize,
    /// Row of the recipe in the corpus and the vector matrix.
    pub row: usize,
}

/// Parse a list-encoded corpus field into its items.
///
/// First tries a strict parse of a bracketed literal with quoted items
/// (`['1 c. sugar', "2 eggs"]`). If that fails, falls back to stripping
/// brackets and splitting on commas. Never fails: blank input yields an
/// empty list, malformed input yields best-effort tokens.
pub fn parse_list(raw: &str) -> Vec<String> {
    match parse_list_literal(raw) {
        Some(items) => items,
        None => split_permissive(raw),
    }
}

/// Strict stage: a bracketed sequence of single- or double-quoted strings.
///
/// Backslash escapes follow Python string literals, including `\xNN`,
/// `\uNNNN`, `\UNNNNNNNN` and octal. A malformed escape rejects the literal.
pub fn parse_list_literal(raw: &str) -> Option<Vec<String>> {
    let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut chars = inner.chars().peekable();
    let mut items = Vec::new();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let quote = match chars.next() {
            None => return Some(items),
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => decode_escape(&mut chars, &mut item)?,
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => return Some(items),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}

/// Decode the escape following a backslash into `out`.
fn decode_escape(chars: &mut Peekable<Chars<'_>>, out: &mut String) -> Option<()> {
    let c = chars.next()?;
    let decoded = match c {
        '\n' => return Some(()),
        '\\' | '\'' | '"' => c,
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'a' => '\u{07}',
        'b' => '\u{08}',
        'f' => '\u{0C}',
        'v' => '\u{0B}',
        'x' => hex_char(chars, 2)?,
        'u' => hex_char(chars, 4)?,
        'U' => hex_char(chars, 8)?,
        '0'..='7' => {
            let mut code = c.to_digit(8)?;
            for _ in 0..2 {
                match chars.next_if(|d| d.is_digit(8)) {
                    Some(d) => code = code * 8 + d.to_digit(8)?,
                    None => break,
                }
            }
            char::from_u32(code)?
        }
        other => {
            out.push('\\');
            other
        }
    };
    out.push(decoded);
    Some(())
}

/// Exactly `digits` hex digits as a code point.
fn hex_char(chars: &mut Peekable<Chars<'_>>, digits: usize) -> Option<char> {
    let mut code = 0u32;
    for _ in 0..digits {
        code = code * 16 + chars.next()?.to_digit(16)?;
    }
    char::from_u32(code)
}

/// Permissive stage: strip brackets, split on commas, trim whitespace and quotes.
fn split_permissive(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
