//! TF-IDF vectorizer for the sparse strategy.
//!
//! Fitting is streamed: a [`TfidfFitter`] accumulates document frequencies
//! chunk by chunk and yields an immutable [`TfidfModel`] that transforms
//! any text into an L2-normalized [`SparseVector`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tastyai_core::{TastyError, TastyResult};

/// Word tokens of two or more characters.
#[allow(clippy::expect_used)]
static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("token pattern is a valid regex"));

/// English stop words dropped before counting. Same set as scikit-learn's
/// `ENGLISH_STOP_WORDS`.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all",
    "almost", "alone", "along", "already", "also", "although", "always", "am", "among",
    "amongst", "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone",
    "anything", "anyway", "anywhere", "are", "around", "as", "at", "back", "be", "became",
    "because", "become", "becomes", "becoming", "been", "before", "beforehand", "behind",
    "being", "below", "beside", "besides", "between", "beyond", "bill", "both", "bottom",
    "but", "by", "call", "can", "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de",
    "describe", "detail", "do", "done", "down", "due", "during", "each", "eg", "eight",
    "either", "eleven", "else", "elsewhere", "empty", "enough", "etc", "even", "ever",
    "every", "everyone", "everything", "everywhere", "except", "few", "fifteen", "fifty",
    "fill", "find", "fire", "first", "five", "for", "former", "formerly", "forty", "found",
    "four", "from", "front", "full", "further", "get", "give", "go", "had", "has", "hasnt",
    "have", "he", "hence", "her", "here", "hereafter", "hereby", "herein", "hereupon", "hers",
    "herself", "him", "himself", "his", "how", "however", "hundred", "i", "ie", "if", "in",
    "inc", "indeed", "interest", "into", "is", "it", "its", "itself", "keep", "last", "latter",
    "latterly", "least", "less", "ltd", "made", "many", "may", "me", "meanwhile", "might",
    "mill", "mine", "more", "moreover", "most", "mostly", "move", "much", "must", "my",
    "myself", "name", "namely", "neither", "never", "nevertheless", "next", "nine", "no",
    "nobody", "none", "noone", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often",
    "on", "once", "one", "only", "onto", "or", "other", "others", "otherwise", "our", "ours",
    "ourselves", "out", "over", "own", "part", "per", "perhaps", "please", "put", "rather",
    "re", "same", "see", "seem", "seemed", "seeming", "seems", "serious", "several", "she",
    "should", "show", "side", "since", "sincere", "six", "sixty", "so", "some", "somehow",
    "someone", "something", "sometime", "sometimes", "somewhere", "still", "such", "system",
    "take", "ten", "than", "that", "the", "their", "them", "themselves", "then", "thence",
    "there", "thereafter", "thereby", "therefore", "therein", "thereupon", "these", "they",
    "thick", "thin", "third", "this", "those", "though", "three", "through", "throughout",
    "thru", "thus", "to", "together", "too", "top", "toward", "towards", "twelve", "twenty",
    "two", "un", "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well",
    "were", "what", "whatever", "when", "whence", "whenever", "where", "whereafter",
    "whereas", "whereby", "wherein", "whereupon", "wherever", "whether", "which", "while",
    "whither", "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within",
    "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

static STOP_WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

/// Lowercase, split on word tokens and drop stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORD_SET.contains(t))
        .map(str::to_string)
        .collect()
}

/// A sparse vector: strictly increasing term indices with their weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    /// Term indices, strictly increasing.
    pub indices: Vec<u32>,
    /// Weights, parallel to `indices`.
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Whether no term is present.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Expand into a dense vector of `dimension` entries. Out-of-range
    /// indices are ignored.
    pub fn to_dense(&self, dimension: usize) -> Vec<f32> {
        let mut dense = vec![0.0f32; dimension];
        for (&i, &v) in self.indices.iter().zip(&self.values) {
            if let Some(slot) = dense.get_mut(i as usize) {
                *slot = v;
            }
        }
        dense
    }
}

/// Streaming accumulator of document frequencies.
#[derive(Debug, Default)]
pub struct TfidfFitter {
    doc_freq: HashMap<String, u64>,
    documents: u64,
}

impl TfidfFitter {
    /// Empty fitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count each distinct term of `text` once.
    pub fn add_document(&mut self, text: &str) {
        let unique: HashSet<String> = tokenize(text).into_iter().collect();
        for term in unique {
            *self.doc_freq.entry(term).or_insert(0) += 1;
        }
        self.documents += 1;
    }

    /// Number of documents seen so far.
    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// Freeze the vocabulary. Terms are ordered lexicographically and
    /// idf is the smoothed `ln((1 + n) / (1 + df)) + 1`.
    pub fn finish(self) -> TfidfModel {
        let n = self.documents as f64;
        let sorted: BTreeMap<String, u64> = self.doc_freq.into_iter().collect();
        let mut terms = Vec::with_capacity(sorted.len());
        let mut idf = Vec::with_capacity(sorted.len());
        for (term, df) in sorted {
            idf.push((((1.0 + n) / (1.0 + df as f64)).ln() + 1.0) as f32);
            terms.push(term);
        }
        TfidfModel::from_parts(terms, idf, self.documents)
    }
}

/// A fitted TF-IDF vocabulary with inverse document frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfModel {
    terms: Vec<String>,
    idf: Vec<f32>,
    documents: u64,
    #[serde(skip)]
    index: HashMap<String, u32>,
}

impl TfidfModel {
    fn from_parts(terms: Vec<String>, idf: Vec<f32>, documents: u64) -> Self {
        let index = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Self {
            terms,
            idf,
            documents,
            index,
        }
    }

    /// Vocabulary size, which is the dimension of every transformed vector.
    pub fn dimension(&self) -> usize {
        self.terms.len()
    }

    /// Number of documents the model was fit on.
    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// Identifier persisted in the cache metadata.
    pub fn model_id(&self) -> String {
        format!("tfidf-{}", self.terms.len())
    }

    /// Transform text with the frozen vocabulary. Unknown terms are dropped;
    /// text with no known terms maps to an empty vector.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<u32, f32> = BTreeMap::new();
        for token in tokenize(text) {
            if let Some(&i) = self.index.get(&token) {
                *counts.entry(i).or_insert(0.0) += 1.0;
            }
        }

        let mut indices = Vec::with_capacity(counts.len());
        let mut values = Vec::with_capacity(counts.len());
        for (i, tf) in counts {
            indices.push(i);
            values.push(tf * self.idf[i as usize]);
        }
        crate::embedding::l2_normalize(&mut values);
        SparseVector { indices, values }
    }

    /// Persist as JSON, written to a temporary sibling and renamed into place.
    pub fn save(&self, path: &Path) -> TastyResult<()> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer(&mut file, self)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Load a model saved with [`TfidfModel::save`].
    pub fn load(path: &Path) -> TastyResult<Self> {
        let bytes = fs::read(path)?;
        let raw: TfidfModel = serde_json::from_slice(&bytes)
            .map_err(|e| TastyError::corrupt(path, format!("unreadable vocabulary: {e}")))?;
        if raw.terms.len() != raw.idf.len() {
            return Err(TastyError::corrupt(
                path,
                format!(
                    "vocabulary has {} terms but {} idf weights",
                    raw.terms.len(),
                    raw.idf.len()
                ),
            ));
        }
        Ok(Self::from_parts(raw.terms, raw.idf, raw.documents))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn fitted(docs: &[&str]) -> TfidfModel {
        let mut fitter = TfidfFitter::new();
        for d in docs {
            fitter.add_document(d);
        }
        fitter.finish()
    }

    #[test]
    fn test_tokenize_drops_short_and_stop_words() {
        assert_eq!(
            tokenize("The Brown sugar, a egg and 2 cups of MILK"),
            vec!["brown", "sugar", "egg", "cups", "milk"]
        );
    }

    #[test]
    fn test_tokenize_drops_recipe_stop_words() {
        assert_eq!(STOP_WORD_SET.len(), 318);
        assert_eq!(tokenize("whole wheat flour"), vec!["wheat", "flour"]);
        assert_eq!(
            tokenize("whole wheat flour top round thin sliced bottom fill full empty"),
            vec!["wheat", "flour", "round", "sliced"]
        );
    }

    #[test]
    fn test_vocabulary_sorted() {
        let model = fitted(&["sugar milk", "flour sugar"]);
        assert_eq!(model.terms, vec!["flour", "milk", "sugar"]);
        assert_eq!(model.dimension(), 3);
        assert_eq!(model.documents(), 2);
    }

    #[test]
    fn test_idf_smoothing() {
        let model = fitted(&["sugar milk", "flour sugar"]);
        // sugar appears in every document
        assert!((model.idf[2] - 1.0).abs() < 1e-6);
        let expected = ((3.0f64 / 2.0).ln() + 1.0) as f32;
        assert!((model.idf[0] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_transform_normalized_and_sorted() {
        let model = fitted(&["sugar milk", "flour sugar", "flour eggs"]);
        let v = model.transform("sugar flour flour unknown");
        assert_eq!(v.nnz(), 2);
        assert!(v.indices.windows(2).all(|w| w[0] < w[1]));
        let norm: f32 = v.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_transform_unknown_text_is_empty() {
        let model = fitted(&["sugar milk"]);
        assert!(model.transform("salmon dill").is_empty());
        assert!(model.transform("").is_empty());
    }

    #[test]
    fn test_to_dense() {
        let v = SparseVector {
            indices: vec![0, 2],
            values: vec![0.6, 0.8],
        };
        assert_eq!(v.to_dense(3), vec![0.6, 0.0, 0.8]);
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tfidf_vocabulary.json");
        let model = fitted(&["sugar milk", "flour eggs"]);
        model.save(&path).unwrap();
        let loaded = TfidfModel::load(&path).unwrap();
        assert_eq!(loaded.dimension(), model.dimension());
        assert_eq!(loaded.transform("milk eggs"), model.transform("milk eggs"));
    }

    #[test]
    fn test_load_rejects_inconsistent_vocabulary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tfidf_vocabulary.json");
        std::fs::write(&path, r#"{"terms":["a","b"],"idf":[1.0],"documents":2}"#).unwrap();
        let err = TfidfModel::load(&path).unwrap_err();
        assert!(err.is_cache_corruption());
    }
}
