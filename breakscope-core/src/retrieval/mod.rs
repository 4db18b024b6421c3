//! Hybrid retrieval: lexical BM25 and dense cosine rankings fused with RRF.
//!
//! [`HybridMatcher::match_chunks_detailed`] is the entry point. For every
//! changed chunk it renders a query ([`query::render_query`]), ranks the full
//! spec set through both rankers and keeps the fused top-K with all three
//! scores. Scoring is CPU-bound and runs across chunks with `rayon`.

pub mod dense;
pub mod fusion;
pub mod lexical;
pub mod query;

use std::collections::HashMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::RetrievalSection;
use crate::error::InputError;
use crate::identity;
use crate::types::{ChangedCodeChunk, ChunkMatches, FusedMatch, ScoredMatch, SpecChunk};

use self::lexical::{LexicalIndex, LexicalParams};

/// A ranker's score for the candidate at `index` in its input list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub index: usize,
    pub score: f64,
}

/// Score descending, then index ascending.
pub(crate) fn sort_ranked(ranked: &mut [Ranked]) {
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
}

/// For every spec, the index of the first spec sharing its content id.
///
/// Specs with identical bodies are one graph node, so only the first of them
/// takes part in ranking.
pub fn canonical_spec_indices(specs: &[SpecChunk]) -> Vec<usize> {
    let mut first: HashMap<String, usize> = HashMap::with_capacity(specs.len());
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| *first.entry(identity::spec_chunk_id(spec)).or_insert(i))
        .collect()
}

/// Single fused-score view of [`ChunkMatches`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkScores<'a> {
    pub chunk: &'a ChangedCodeChunk,
    pub relevant_specs: Vec<ScoredMatch<'a>>,
}

/// Fuses lexical and dense rankings of spec chunks per changed chunk.
#[derive(Debug, Clone)]
pub struct HybridMatcher {
    lexical: LexicalParams,
    rrf_k: f64,
    top_k: usize,
}

impl Default for HybridMatcher {
    fn default() -> Self {
        Self::from_config(&RetrievalSection::default())
    }
}

impl HybridMatcher {
    pub fn from_config(section: &RetrievalSection) -> Self {
        Self {
            lexical: LexicalParams::from(section),
            rrf_k: section.rrf_k,
            top_k: section.top_k,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Match every changed chunk against the spec set.
    ///
    /// `changed_vectors[i]` embeds `changed[i]` and `spec_vectors[j]` embeds
    /// `specs[j]`. An empty spec set gives every chunk an empty match list
    /// without building an index; an empty chunk set gives an empty result.
    #[instrument(skip_all, fields(changed = changed.len(), specs = specs.len()))]
    pub fn match_chunks_detailed<'a>(
        &self,
        changed: &'a [ChangedCodeChunk],
        changed_vectors: &[Vec<f32>],
        specs: &'a [SpecChunk],
        spec_vectors: &[Vec<f32>],
    ) -> Result<Vec<ChunkMatches<'a>>, InputError> {
        check_len("changed chunk embeddings", changed.len(), changed_vectors.len())?;
        check_len("spec chunk embeddings", specs.len(), spec_vectors.len())?;

        if changed.is_empty() {
            return Ok(Vec::new());
        }
        if specs.is_empty() {
            return Ok(changed
                .iter()
                .map(|chunk| ChunkMatches {
                    chunk,
                    relevant_specs: Vec::new(),
                })
                .collect());
        }

        let index = LexicalIndex::build(specs, self.lexical);
        let canonical = canonical_spec_indices(specs);
        let distinct = |r: &Ranked| canonical[r.index] == r.index;

        changed
            .par_iter()
            .zip(changed_vectors.par_iter())
            .map(|(chunk, vector)| {
                let query = query::render_query(chunk);
                let mut dense_ranking = dense::rank_by_similarity(vector, spec_vectors)?;
                dense_ranking.retain(distinct);
                let mut lexical_ranking = index.search_ranked(&query);
                lexical_ranking.retain(distinct);
                debug!(
                    file = %chunk.filename,
                    lexical_hits = lexical_ranking.len(),
                    "ranked chunk"
                );

                let relevant_specs = fusion::reciprocal_rank_fusion(
                    &dense_ranking,
                    &lexical_ranking,
                    self.rrf_k,
                    self.top_k,
                )
                .into_iter()
                .map(|f| FusedMatch {
                    chunk: &specs[f.index],
                    cosine_score: f.cosine_score,
                    bm25_score: f.bm25_score,
                    rrf_score: f.rrf_score,
                    rank: f.rank,
                })
                .collect();

                Ok(ChunkMatches {
                    chunk,
                    relevant_specs,
                })
            })
            .collect()
    }

    /// Same ranking as [`Self::match_chunks_detailed`], reporting only the
    /// fused score.
    pub fn match_chunks<'a>(
        &self,
        changed: &'a [ChangedCodeChunk],
        changed_vectors: &[Vec<f32>],
        specs: &'a [SpecChunk],
        spec_vectors: &[Vec<f32>],
    ) -> Result<Vec<ChunkScores<'a>>, InputError> {
        Ok(self
            .match_chunks_detailed(changed, changed_vectors, specs, spec_vectors)?
            .into_iter()
            .map(|m| ChunkScores {
                chunk: m.chunk,
                relevant_specs: m
                    .relevant_specs
                    .into_iter()
                    .map(|f| ScoredMatch {
                        chunk: f.chunk,
                        score: f.rrf_score,
                    })
                    .collect(),
            })
            .collect())
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), InputError> {
    if expected == actual {
        Ok(())
    } else {
        Err(InputError::LengthMismatch {
            what,
            expected,
            actual,
        })
    }
}
