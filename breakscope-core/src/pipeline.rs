// Run orchestrator: infrastructure → run → embeddings → match & persist → predictions.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, instrument, warn};

use crate::config::BreakscopeConfig;
use crate::embedding::Embedder;
use crate::error::{BreakscopeError, EmbeddingError, InputError, Result};
use crate::identity;
use crate::predictions;
use crate::repository::{AnalysisRunMeta, GraphRepository, MatchScores};
use crate::retrieval::{HybridMatcher, canonical_spec_indices};
use crate::retrieval::query::{render_query, render_spec_text};
use crate::types::{
    AnalysisRunInput, ChangedCodeChunk, ChunkMatches, PredictionCounts, RunIds, RunSummary,
    SpecChunk, UpstreamPrediction,
};

/// Upper bound on graph transactions in flight during fan-out.
pub const DEFAULT_PERSIST_CONCURRENCY: usize = 8;

/// Vectors for both sides of a run, index-aligned with their inputs.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedInputs {
    pub chunk_vectors: Vec<Vec<f32>>,
    pub spec_vectors: Vec<Vec<f32>>,
}

async fn embed_texts(embedder: &dyn Embedder, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed_batch(&texts).await?;
    if vectors.len() != texts.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: texts.len(),
            actual: vectors.len(),
        }
        .into());
    }
    Ok(vectors)
}

/// Embed changed chunks and spec chunks as two concurrent batches.
#[instrument(skip_all, fields(chunks = chunks.len(), specs = specs.len()))]
pub async fn embed_inputs(
    embedder: &dyn Embedder,
    chunks: &[ChangedCodeChunk],
    specs: &[SpecChunk],
) -> Result<EmbeddedInputs> {
    let chunk_texts = chunks.iter().map(render_query).collect();
    let spec_texts = specs.iter().map(render_spec_text).collect();

    let (chunk_vectors, spec_vectors) = tokio::try_join!(
        embed_texts(embedder, chunk_texts),
        embed_texts(embedder, spec_texts),
    )?;

    if let (Some(c), Some(s)) = (chunk_vectors.first(), spec_vectors.first()) {
        if c.len() != s.len() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: c.len(),
                actual: s.len(),
            }
            .into());
        }
    }

    Ok(EmbeddedInputs {
        chunk_vectors,
        spec_vectors,
    })
}

/// Outcome of persisting one changed chunk's subgraph.
struct ChunkOutcome {
    matched_specs: Vec<usize>,
}

/// Composes retrieval and persistence for one analysis run at a time.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    repo: GraphRepository,
    embedder: Arc<dyn Embedder>,
    matcher: HybridMatcher,
    concurrency: usize,
}

impl AnalysisPipeline {
    pub fn new(repo: GraphRepository, embedder: Arc<dyn Embedder>, config: &BreakscopeConfig) -> Self {
        Self {
            repo,
            embedder,
            matcher: HybridMatcher::from_config(&config.retrieval),
            concurrency: DEFAULT_PERSIST_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn repository(&self) -> &GraphRepository {
        &self.repo
    }

    fn validate(input: &AnalysisRunInput) -> std::result::Result<(), InputError> {
        if input.org_name.trim().is_empty() {
            return Err(InputError::MissingField("orgName"));
        }
        if input.repo_full_name.trim().is_empty() {
            return Err(InputError::MissingField("repoFullName"));
        }
        Ok(())
    }

    /// Persist one analysis run end to end.
    ///
    /// The returned IDs are only meaningful on `Ok`; an error means the run
    /// was not fully persisted.
    #[instrument(skip_all, fields(repo = %input.repo_full_name, pr = input.pr_metadata.number))]
    pub async fn run(&self, input: &AnalysisRunInput) -> Result<(RunIds, RunSummary)> {
        Self::validate(input)?;
        let specs = input.spec_chunks();
        let mut summary = RunSummary::default();

        // Phase 1: infrastructure chain
        let org_id = self.repo.merge_organization(&input.org_name).await?;
        let repo_id = self
            .repo
            .merge_repository(&org_id, &input.repo_full_name)
            .await?;
        let pr_id = self
            .repo
            .merge_pull_request(&repo_id, &input.pr_metadata)
            .await?;

        // Phase 2: fresh run
        let run_id = self
            .repo
            .create_analysis_run(
                &pr_id,
                &AnalysisRunMeta {
                    model: input.model.clone(),
                    temperature: input.temperature,
                    started_at: input.analysis_started_at,
                    llm_duration_ms: input.llm_duration_ms,
                },
            )
            .await?;
        info!(run_id = %run_id, "Analysis run created");

        // Phase 3: embeddings
        let embedded = embed_inputs(self.embedder.as_ref(), &input.ast_chunks, &specs).await?;

        // Phase 4: match and persist
        let matches = self.matcher.match_chunks_detailed(
            &input.ast_chunks,
            &embedded.chunk_vectors,
            &specs,
            &embedded.spec_vectors,
        )?;
        let persisted_specs = self
            .persist_matches(&run_id, &matches, &specs, &embedded, &mut summary)
            .await?;

        // Phase 5: predictions
        let prediction_id = self
            .persist_predictions(input, &run_id, &specs, &persisted_specs, &mut summary)
            .await?;

        info!(
            run_id = %run_id,
            chunks = summary.chunks_persisted,
            failures = summary.chunk_failures,
            specs = summary.specs_persisted,
            matches = summary.matches_persisted,
            verdicts = summary.per_test_predictions,
            "Analysis run persisted"
        );
        Ok((
            RunIds {
                run_id,
                prediction_id,
            },
            summary,
        ))
    }

    async fn persist_chunk(
        &self,
        run_id: &str,
        order: usize,
        matched: &ChunkMatches<'_>,
        specs: &[SpecChunk],
        embedded: &EmbeddedInputs,
    ) -> Result<ChunkOutcome> {
        let chunk_id = self
            .repo
            .merge_changed_chunk(run_id, order, matched.chunk, &embedded.chunk_vectors[order])
            .await?;

        let mut matched_specs = Vec::with_capacity(matched.relevant_specs.len());
        for m in &matched.relevant_specs {
            let Some(index) = specs.iter().position(|s| std::ptr::eq(s, m.chunk)) else {
                continue;
            };
            self.repo
                .merge_matched_spec(
                    &chunk_id,
                    m.chunk,
                    Some(embedded.spec_vectors[index].as_slice()),
                    MatchScores::from(m),
                )
                .await?;
            matched_specs.push(index);
        }
        Ok(ChunkOutcome { matched_specs })
    }

    /// Fan out per-chunk persistence. Returns the indices of spec chunks
    /// known to be in the store afterwards.
    #[instrument(skip_all, fields(chunks = matches.len()))]
    async fn persist_matches(
        &self,
        run_id: &str,
        matches: &[ChunkMatches<'_>],
        specs: &[SpecChunk],
        embedded: &EmbeddedInputs,
        summary: &mut RunSummary,
    ) -> Result<HashSet<usize>> {
        let futures: Vec<_> = matches
            .iter()
            .enumerate()
            .map(|(order, m)| async move {
                (order, self.persist_chunk(run_id, order, m, specs, embedded).await)
            })
            .collect();
        let results: Vec<(usize, Result<ChunkOutcome>)> = stream::iter(futures)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut persisted = HashSet::new();
        let mut fatal: Option<BreakscopeError> = None;
        for (order, result) in results {
            match result {
                Ok(outcome) => {
                    summary.chunks_persisted += 1;
                    summary.matches_persisted += outcome.matched_specs.len();
                    persisted.extend(outcome.matched_specs);
                }
                Err(e) if e.is_unavailable() => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    summary.chunk_failures += 1;
                    warn!(
                        file = %matches[order].chunk.filename,
                        order,
                        error = %e,
                        "Failed to persist changed chunk"
                    );
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }

        // Specs matched by nothing are kept as unlinked nodes
        let canonical = canonical_spec_indices(specs);
        let unmatched: Vec<usize> = (0..specs.len())
            .filter(|&i| canonical[i] == i && !persisted.contains(&i))
            .collect();
        let futures: Vec<_> = unmatched
            .into_iter()
            .map(|index| async move {
                let spec = &specs[index];
                let vector = embedded.spec_vectors.get(index).map(Vec::as_slice);
                (index, self.repo.merge_spec_chunk(spec, vector).await)
            })
            .collect();
        let results: Vec<(usize, Result<String>)> = stream::iter(futures)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (index, result) in results {
            match result {
                Ok(_) => {
                    persisted.insert(index);
                }
                Err(e) if e.is_unavailable() => {
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    warn!(
                        test = %specs[index].test_name,
                        error = %e,
                        "Failed to persist spec chunk"
                    );
                }
            }
        }
        if let Some(e) = fatal {
            return Err(e);
        }
        summary.specs_persisted = persisted.len();
        // Duplicate bodies share the node of their first occurrence
        let duplicates: Vec<usize> = (0..specs.len())
            .filter(|&i| persisted.contains(&canonical[i]))
            .collect();
        persisted.extend(duplicates);
        info!(
            chunks = summary.chunks_persisted,
            specs = summary.specs_persisted,
            "Chunks and matches persisted"
        );
        Ok(persisted)
    }

    #[instrument(skip_all)]
    async fn persist_predictions(
        &self,
        input: &AnalysisRunInput,
        run_id: &str,
        specs: &[SpecChunk],
        persisted_specs: &HashSet<usize>,
        summary: &mut RunSummary,
    ) -> Result<String> {
        let parsed;
        let verdicts: &[UpstreamPrediction] =
            if input.predictions.is_empty() && !input.raw_markdown.trim().is_empty() {
                parsed = predictions::parse_markdown(&input.raw_markdown);
                &parsed
            } else {
                &input.predictions
            };

        let counts = PredictionCounts::from_predictions(verdicts);
        let prediction_id = self
            .repo
            .create_prediction(run_id, counts, &input.raw_markdown)
            .await?;

        for verdict in verdicts {
            let resolved = UpstreamPrediction {
                file: predictions::resolve_file(verdict, specs),
                ..verdict.clone()
            };
            let spec_id = predictions::best_matching_spec(verdict, specs)
                .and_then(|s| {
                    specs
                        .iter()
                        .position(|c| std::ptr::eq(c, s))
                        .filter(|i| persisted_specs.contains(i))
                        .map(|_| s)
                })
                .map(identity::spec_chunk_id);
            self.repo
                .create_per_test_prediction(&prediction_id, &resolved, spec_id.as_deref())
                .await?;
            summary.per_test_predictions += 1;
        }
        Ok(prediction_id)
    }
}

/// Persist one analysis run and return its identifiers.
pub async fn persist_analysis_run(
    repo: &GraphRepository,
    embedder: Arc<dyn Embedder>,
    input: &AnalysisRunInput,
    config: &BreakscopeConfig,
) -> Result<RunIds> {
    let pipeline = AnalysisPipeline::new(repo.clone(), embedder, config);
    let (ids, _) = pipeline.run(input).await?;
    Ok(ids)
}

// ── Tests ───────────────────────────────────────────────────────────
