//! BM25 keyword index over spec chunks.
//!
//! Two fields are indexed per chunk, the test name and the body, each in its
//! own [`bm25`] search engine. The name field's score is multiplied by
//! [`LexicalParams::name_boost`]. A query term also matches vocabulary terms
//! within a bounded edit distance, discounted by `1 / (1 + distance)`, so a
//! lightly renamed identifier (`submitOrder` -> `submitOrders`) still
//! partially matches.
//!
//! The index is rebuilt for every run and holds no persistent state.

use std::collections::BTreeMap;

use bm25::{Document, SearchEngine, SearchEngineBuilder, Tokenizer};
use tracing::instrument;

use crate::config::RetrievalSection;
use crate::types::{ScoredMatch, SpecChunk};

use super::Ranked;

/// Scoring knobs, usually taken from [`RetrievalSection`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalParams {
    pub k1: f64,
    pub b: f64,
    pub name_boost: f64,
    pub max_edit_distance: usize,
    pub min_fuzzy_term_len: usize,
}

impl Default for LexicalParams {
    fn default() -> Self {
        Self::from(&RetrievalSection::default())
    }
}

impl From<&RetrievalSection> for LexicalParams {
    fn from(section: &RetrievalSection) -> Self {
        Self {
            k1: section.bm25_k1,
            b: section.bm25_b,
            name_boost: section.name_boost,
            max_edit_distance: section.max_edit_distance,
            min_fuzzy_term_len: section.min_fuzzy_term_len,
        }
    }
}

/// Identifier-aware tokenizer: no stemming, no stop words, `camelCase`
/// parts kept alongside the whole word.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecTokenizer;

impl Tokenizer for SpecTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        tokenize(input_text)
    }
}

type FieldEngine = SearchEngine<usize, u32, SpecTokenizer>;

#[allow(clippy::cast_possible_truncation)]
fn field_engine<'a>(texts: impl Iterator<Item = &'a str>, params: &LexicalParams) -> FieldEngine {
    let documents: Vec<Document<usize>> = texts
        .enumerate()
        .map(|(id, text)| Document::new(id, text.to_owned()))
        .collect();
    SearchEngineBuilder::<usize, u32, SpecTokenizer>::with_tokenizer_and_documents(
        SpecTokenizer,
        documents,
    )
    .k1(params.k1 as f32)
    .b(params.b as f32)
    .build()
}

/// Keyword index built from one run's spec chunks.
pub struct LexicalIndex {
    name: Option<FieldEngine>,
    body: Option<FieldEngine>,
    /// Union of both fields' vocabularies, for fuzzy expansion.
    vocabulary: Vec<String>,
    params: LexicalParams,
    len: usize,
}

impl std::fmt::Debug for LexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalIndex")
            .field("len", &self.len)
            .field("vocabulary", &self.vocabulary.len())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl LexicalIndex {
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub fn build(chunks: &[SpecChunk], params: LexicalParams) -> Self {
        if chunks.is_empty() {
            return Self {
                name: None,
                body: None,
                vocabulary: Vec::new(),
                params,
                len: 0,
            };
        }

        let name = field_engine(chunks.iter().map(|c| c.test_name.as_str()), &params);
        let body = field_engine(chunks.iter().map(|c| c.body.as_str()), &params);

        let mut vocabulary: Vec<String> = chunks
            .iter()
            .flat_map(|c| tokenize(&c.test_name).into_iter().chain(tokenize(&c.body)))
            .collect();
        vocabulary.sort_unstable();
        vocabulary.dedup();

        Self {
            name: Some(name),
            body: Some(body),
            vocabulary,
            params,
            len: chunks.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rank by candidate index. Only chunks with a positive score are returned,
    /// best first; equal scores keep index order.
    pub fn search_ranked(&self, query: &str) -> Vec<Ranked> {
        let (Some(name), Some(body)) = (&self.name, &self.body) else {
            return Vec::new();
        };

        let terms = tokenize(query);
        // Each vocabulary term is scored once, at the best weight any query
        // term reaches it with.
        let mut weights: BTreeMap<&str, f64> = BTreeMap::new();
        for term in &terms {
            for (candidate, weight) in self.expand(term) {
                let slot = weights.entry(candidate).or_insert(0.0);
                *slot = slot.max(weight);
            }
        }

        let mut scores = vec![0.0_f64; self.len];
        for (term, weight) in weights {
            for (engine, boost) in [(name, self.params.name_boost), (body, 1.0)] {
                for hit in engine.search(term, self.len) {
                    if let Some(score) = scores.get_mut(hit.document.id) {
                        *score += weight * boost * f64::from(hit.score);
                    }
                }
            }
        }

        let mut ranked: Vec<Ranked> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .map(|(index, score)| Ranked { index, score })
            .collect();
        super::sort_ranked(&mut ranked);
        ranked
    }

    /// Resolve ranked indices back onto `chunks`, which must be the slice the
    /// index was built from.
    pub fn search<'a>(&self, chunks: &'a [SpecChunk], query: &str) -> Vec<ScoredMatch<'a>> {
        debug_assert_eq!(chunks.len(), self.len);
        self.search_ranked(query)
            .into_iter()
            .filter_map(|r| {
                chunks.get(r.index).map(|chunk| ScoredMatch {
                    chunk,
                    score: r.score,
                })
            })
            .collect()
    }

    /// Vocabulary terms a query term matches, with their weights.
    fn expand<'t>(&'t self, term: &'t str) -> Vec<(&'t str, f64)> {
        let term_len = term.chars().count();
        if self.params.max_edit_distance == 0 || term_len < self.params.min_fuzzy_term_len {
            return vec![(term, 1.0)];
        }
        let max = self.params.max_edit_distance;

        let mut out: Vec<(&str, f64)> = vec![(term, 1.0)];
        for candidate in &self.vocabulary {
            if candidate == term || candidate.chars().count().abs_diff(term_len) > max {
                continue;
            }
            let distance = strsim::levenshtein(candidate, term);
            if distance <= max {
                out.push((candidate.as_str(), edit_weight(distance)));
            }
        }
        out
    }
}

#[allow(clippy::cast_precision_loss)]
fn edit_weight(distance: usize) -> f64 {
    1.0 / (1.0 + distance as f64)
}

/// Lowercased alphanumeric tokens. `camelCase` identifiers additionally
/// contribute their parts.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.is_empty() {
            continue;
        }
        let parts = camel_parts(raw);
        tokens.push(raw.to_lowercase());
        if parts.len() > 1 {
            tokens.extend(parts.into_iter().map(|p| p.to_lowercase()));
        }
    }
    tokens
}

fn camel_parts(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev_lower = false;
    for (i, c) in word.char_indices() {
        if c.is_uppercase() && prev_lower {
            parts.push(&word[start..i]);
            start = i;
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
    }
    parts.push(&word[start..]);
    parts
}
