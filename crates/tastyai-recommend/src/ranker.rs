use std::borrow::Cow;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tastyai_core::{RankedCandidate, TastyError, TastyResult};
use tastyai_memory::{EmbeddedQuery, RecipeCatalog, VectorStore};
use tracing::debug;

/// How rows with equal scores are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TieBreak {
    /// Equal scores are ordered by ascending row index. Fully reproducible.
    #[default]
    RowIndex,
    /// Uniform noise in `[0, amplitude)` is added to every score to decide
    /// the order. Reported scores stay unperturbed.
    Jitter {
        /// Upper bound of the noise.
        amplitude: f32,
        /// Fixed seed; every call then produces the same noise.
        seed: Option<u64>,
    },
}

/// Ranker configuration, fixed for the lifetime of a [`Ranker`].
#[derive(Debug, Clone, Default)]
pub struct RankerOptions {
    /// Ordering of equal scores.
    pub tie_break: TieBreak,
}

/// Scores every store row against a query and keeps the best `top_n`.
///
/// Holds no mutable state; one ranker can serve concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    options: RankerOptions,
}

impl Ranker {
    /// Ranker with the given options.
    pub fn new(options: RankerOptions) -> Self {
        Self { options }
    }

    /// Embed `query_text` with the store's model and rank the catalog.
    pub async fn rank(
        &self,
        query_text: &str,
        store: &VectorStore,
        catalog: &RecipeCatalog,
        top_n: usize,
    ) -> TastyResult<Vec<RankedCandidate>> {
        if query_text.trim().is_empty() {
            return Err(TastyError::InvalidArgument("query text is empty".into()));
        }
        let query = store.embed_query(query_text).await?;
        self.rank_embedded(&query, store, catalog, top_n)
    }

    /// Rank with an already embedded query. The query space must match the store.
    pub fn rank_embedded(
        &self,
        query: &EmbeddedQuery,
        store: &VectorStore,
        catalog: &RecipeCatalog,
        top_n: usize,
    ) -> TastyResult<Vec<RankedCandidate>> {
        if top_n == 0 {
            return Err(TastyError::InvalidArgument("top_n must be at least 1".into()));
        }
        if catalog.len() != store.rows() {
            return Err(TastyError::corrupt(
                store.paths().matrix(store.strategy()),
                format!(
                    "matrix has {} rows but the corpus has {}",
                    store.rows(),
                    catalog.len()
                ),
            ));
        }

        let scores = store.similarity_scores(query)?;
        let keys = self.ordering_keys(&scores);

        let ranked: Vec<RankedCandidate> = select_top(&keys, top_n)
            .into_iter()
            .enumerate()
            .filter_map(|(i, (row, _))| {
                catalog.get(row).map(|recipe| RankedCandidate {
                    recipe: recipe.clone(),
                    score: scores[row],
                    rank: i + 1,
                    row,
                })
            })
            .collect();
        debug!(
            rows = scores.len(),
            returned = ranked.len(),
            top_n,
            tie_break = ?self.options.tie_break,
            "Ranked corpus"
        );
        Ok(ranked)
    }

    /// Values that decide the order: the scores themselves, or a jittered
    /// copy under [`TieBreak::Jitter`].
    fn ordering_keys<'a>(&self, scores: &'a [f32]) -> Cow<'a, [f32]> {
        let TieBreak::Jitter { amplitude, seed } = self.options.tie_break else {
            return Cow::Borrowed(scores);
        };
        if amplitude <= 0.0 {
            return Cow::Borrowed(scores);
        }
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Cow::Owned(
            scores
                .iter()
                .map(|score| score + rng.random::<f32>() * amplitude)
                .collect(),
        )
    }
}

/// Heap entry ordered so that "greater" means "ranks earlier".
#[derive(Debug, Clone, Copy)]
struct Scored {
    score: f32,
    row: usize,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.row.cmp(&self.row))
    }
}

/// Best `k` `(row, score)` pairs by descending score, ties by ascending row.
fn select_top(scores: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut heap: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(k.min(scores.len()) + 1);
    for (row, &score) in scores.iter().enumerate() {
        let entry = Scored { score, row };
        if heap.len() < k {
            heap.push(Reverse(entry));
        } else if heap.peek().is_some_and(|worst| entry > worst.0) {
            heap.pop();
            heap.push(Reverse(entry));
        }
    }
    heap.into_sorted_vec()
        .into_iter()
        .map(|Reverse(s)| (s.row, s.score))
        .collect()
}
