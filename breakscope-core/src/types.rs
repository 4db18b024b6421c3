use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Changed code ───────────────────────────────────────────────────

/// Before/after value of one test-selector attribute on a UI element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorChange {
    /// Element or component name carrying the attribute (`button`, `CheckoutForm`).
    pub element: String,
    /// Attribute name (`data-testid`, `data-cy`, ...).
    pub attribute: String,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub removed: Option<String>,
}

/// Structural facts extracted from a diff hunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkMetadata {
    pub components: Vec<String>,
    pub functions: Vec<String>,
    pub selector_changes: Vec<SelectorChange>,
    /// Test-selector strings referenced anywhere in the hunk.
    pub test_selectors: Vec<String>,
}

/// One semantically cohesive unit of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangedCodeChunk {
    pub filename: String,
    pub raw_diff: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
    #[serde(default)]
    pub summary: String,
}

// ── Specs ──────────────────────────────────────────────────────────

/// One end-to-end test case. Identity is its body text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecChunk {
    pub test_name: String,
    pub filename: String,
    pub body: String,
}

/// A spec file split into its test cases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecFile {
    pub filename: String,
    #[serde(default)]
    pub chunks: Vec<SpecChunk>,
}

// ── Retrieval results ──────────────────────────────────────────────

/// Output of a single ranker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredMatch<'a> {
    pub chunk: &'a SpecChunk,
    pub score: f64,
}

/// A fused candidate with every signal that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedMatch<'a> {
    pub chunk: &'a SpecChunk,
    /// Raw cosine similarity; 0 when absent from the dense ranking.
    pub cosine_score: f64,
    /// Raw BM25 score; 0 when absent from the lexical ranking.
    pub bm25_score: f64,
    pub rrf_score: f64,
    /// 1-based position in the fused list.
    pub rank: usize,
}

/// Fused matches for one changed chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMatches<'a> {
    pub chunk: &'a ChangedCodeChunk,
    pub relevant_specs: Vec<FusedMatch<'a>>,
}

// ── Infrastructure ─────────────────────────────────────────────────

/// Pull request facts as reported by the hosting service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrMetadata {
    pub number: i64,
    pub title: String,
    pub author: String,
    pub base_branch: String,
    pub head_branch: String,
    pub head_sha: String,
    pub url: String,
}

// ── Predictions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Broken,
    Risk,
    Ok,
}

impl PredictionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Broken => "broken",
            Self::Risk => "risk",
            Self::Ok => "ok",
        }
    }
}

impl std::fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One verdict from the upstream language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamPrediction {
    pub test: String,
    /// Spec file the test lives in; empty when the model did not say.
    #[serde(default)]
    pub file: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionCounts {
    pub broken: i64,
    pub risk: i64,
    pub ok: i64,
}

impl PredictionCounts {
    pub fn from_predictions(predictions: &[UpstreamPrediction]) -> Self {
        predictions
            .iter()
            .fold(Self::default(), |mut counts, p| {
                match p.status {
                    PredictionStatus::Broken => counts.broken += 1,
                    PredictionStatus::Risk => counts.risk += 1,
                    PredictionStatus::Ok => counts.ok += 1,
                }
                counts
            })
    }

    pub fn total(&self) -> i64 {
        self.broken + self.risk + self.ok
    }
}

// ── Run input / output ─────────────────────────────────────────────

/// Everything one analysis run persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRunInput {
    pub org_name: String,
    pub repo_full_name: String,
    pub pr_metadata: PrMetadata,
    #[serde(default)]
    pub ast_chunks: Vec<ChangedCodeChunk>,
    #[serde(default)]
    pub spec_files: Vec<SpecFile>,
    #[serde(default)]
    pub raw_markdown: String,
    #[serde(default)]
    pub predictions: Vec<UpstreamPrediction>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    pub analysis_started_at: DateTime<Utc>,
    #[serde(default)]
    pub llm_duration_ms: i64,
}

impl AnalysisRunInput {
    pub fn spec_chunks(&self) -> Vec<SpecChunk> {
        self.spec_files
            .iter()
            .flat_map(|f| f.chunks.iter().cloned())
            .collect()
    }
}

/// Identifiers returned once every phase of a run has committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunIds {
    pub run_id: String,
    pub prediction_id: String,
}

/// What a run wrote, for logging and CLI output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub chunks_persisted: usize,
    pub chunk_failures: usize,
    pub specs_persisted: usize,
    pub matches_persisted: usize,
    pub per_test_predictions: usize,
}
