//! Typed create/merge operations over the fixed analysis schema.
//!
//! `merge_*` operations are idempotent and return the content-derived ID;
//! `create_*` operations always insert a fresh event node with a random ID.
//! Each call is one [`GraphWrite`], so a node is never visible without the
//! relationship that anchors it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::error::Result;
use crate::identity;
use crate::store::{GraphStore, GraphWrite, NodeLabel, NodeRef, PropValue, Props, RelType};
use crate::types::{
    ChangedCodeChunk, FusedMatch, PrMetadata, PredictionCounts, SpecChunk, UpstreamPrediction,
};

/// Scores carried on a `MATCHED` relationship.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScores {
    pub cosine: f64,
    pub lexical: f64,
    pub fused: f64,
    pub rank: usize,
}

impl From<&FusedMatch<'_>> for MatchScores {
    fn from(m: &FusedMatch<'_>) -> Self {
        Self {
            cosine: m.cosine_score,
            lexical: m.bm25_score,
            fused: m.rrf_score,
            rank: m.rank,
        }
    }
}

/// Properties of a freshly created analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisRunMeta {
    pub model: String,
    pub temperature: f64,
    pub started_at: DateTime<Utc>,
    pub llm_duration_ms: i64,
}

fn int(n: usize) -> PropValue {
    PropValue::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

#[derive(Debug, Clone)]
pub struct GraphRepository {
    store: Arc<dyn GraphStore>,
}

impl GraphRepository {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub async fn verify_connectivity(&self) -> Result<()> {
        self.store.verify_connectivity().await
    }

    /// Idempotently establish uniqueness constraints on node ids.
    pub async fn ensure_constraints(&self) -> Result<()> {
        self.store.ensure_constraints().await
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    // ── Infrastructure chain ───────────────────────────────────────

    pub async fn merge_organization(&self, name: &str) -> Result<String> {
        let id = identity::organization_id(name);
        self.store
            .execute(GraphWrite::new().merge_node(
                NodeRef::new(NodeLabel::Organization, id.clone()),
                vec![("name", name.into())],
                vec![],
            ))
            .await?;
        Ok(id)
    }

    /// Merge a repository under its organization. `repo_full_name` is
    /// `<org>/<repo>`.
    pub async fn merge_repository(&self, org_id: &str, repo_full_name: &str) -> Result<String> {
        let id = identity::repository_id(repo_full_name);
        let name = repo_full_name
            .rsplit_once('/')
            .map_or(repo_full_name, |(_, name)| name);
        let repo = NodeRef::new(NodeLabel::Repository, id.clone());
        self.store
            .execute(
                GraphWrite::new()
                    .merge_node(
                        repo.clone(),
                        vec![("full_name", repo_full_name.into()), ("name", name.into())],
                        vec![],
                    )
                    .merge_relationship(
                        NodeRef::new(NodeLabel::Organization, org_id),
                        RelType::Owns,
                        repo,
                        vec![],
                    ),
            )
            .await?;
        Ok(id)
    }

    pub async fn merge_pull_request(&self, repo_id: &str, pr: &PrMetadata) -> Result<String> {
        let id = identity::pull_request_id(repo_id, pr.number);
        let node = NodeRef::new(NodeLabel::PullRequest, id.clone());
        self.store
            .execute(
                GraphWrite::new()
                    .merge_node(
                        node.clone(),
                        vec![("number", pr.number.into())],
                        vec![
                            ("title", pr.title.as_str().into()),
                            ("author", pr.author.as_str().into()),
                            ("base_branch", pr.base_branch.as_str().into()),
                            ("head_branch", pr.head_branch.as_str().into()),
                            ("head_sha", pr.head_sha.as_str().into()),
                            ("url", pr.url.as_str().into()),
                        ],
                    )
                    .merge_relationship(
                        NodeRef::new(NodeLabel::Repository, repo_id),
                        RelType::HasPr,
                        node,
                        vec![],
                    ),
            )
            .await?;
        Ok(id)
    }

    // ── Events ─────────────────────────────────────────────────────

    pub async fn create_analysis_run(&self, pr_id: &str, meta: &AnalysisRunMeta) -> Result<String> {
        let id = identity::event_id();
        let run = NodeRef::new(NodeLabel::AnalysisRun, id.clone());
        self.store
            .execute(
                GraphWrite::new()
                    .create_node(
                        run.clone(),
                        vec![
                            ("model", meta.model.as_str().into()),
                            ("temperature", meta.temperature.into()),
                            ("started_at", meta.started_at.to_rfc3339().into()),
                            ("llm_duration_ms", meta.llm_duration_ms.into()),
                        ],
                    )
                    .merge_relationship(
                        NodeRef::new(NodeLabel::PullRequest, pr_id),
                        RelType::AnalyzedBy,
                        run,
                        vec![],
                    ),
            )
            .await?;
        Ok(id)
    }

    pub async fn create_prediction(
        &self,
        run_id: &str,
        counts: PredictionCounts,
        raw_markdown: &str,
    ) -> Result<String> {
        let id = identity::event_id();
        let prediction = NodeRef::new(NodeLabel::Prediction, id.clone());
        self.store
            .execute(
                GraphWrite::new()
                    .create_node(
                        prediction.clone(),
                        vec![
                            ("broken", counts.broken.into()),
                            ("risk", counts.risk.into()),
                            ("ok", counts.ok.into()),
                            ("total", counts.total().into()),
                            ("raw_markdown", raw_markdown.into()),
                        ],
                    )
                    .merge_relationship(
                        NodeRef::new(NodeLabel::AnalysisRun, run_id),
                        RelType::Produced,
                        prediction,
                        vec![],
                    ),
            )
            .await?;
        Ok(id)
    }

    /// `spec_id` links the verdict to the spec chunk it refers to, if known.
    pub async fn create_per_test_prediction(
        &self,
        prediction_id: &str,
        verdict: &UpstreamPrediction,
        spec_id: Option<&str>,
    ) -> Result<String> {
        let id = identity::event_id();
        let node = NodeRef::new(NodeLabel::PerTestPrediction, id.clone());
        let mut write = GraphWrite::new()
            .create_node(
                node.clone(),
                vec![
                    ("test", verdict.test.as_str().into()),
                    ("file", verdict.file.as_str().into()),
                    ("status", verdict.status.as_str().into()),
                    ("reason", verdict.reason.as_str().into()),
                ],
            )
            .merge_relationship(
                NodeRef::new(NodeLabel::Prediction, prediction_id),
                RelType::Contains,
                node.clone(),
                vec![],
            );
        if let Some(spec_id) = spec_id {
            write = write.merge_relationship(
                node,
                RelType::RefersTo,
                NodeRef::new(NodeLabel::SpecChunk, spec_id),
                vec![],
            );
        }
        self.store.execute(write).await?;
        Ok(id)
    }

    // ── Content-addressed chunks ───────────────────────────────────

    /// Merge a changed chunk, its selector changes, and its ordered
    /// `INCLUDES` edge from the run.
    #[instrument(skip_all, fields(file = %chunk.filename, order = order))]
    pub async fn merge_changed_chunk(
        &self,
        run_id: &str,
        order: usize,
        chunk: &ChangedCodeChunk,
        embedding: &[f32],
    ) -> Result<String> {
        let id = identity::changed_chunk_id(chunk);
        let node = NodeRef::new(NodeLabel::ChangedCodeChunk, id.clone());
        let meta = &chunk.metadata;

        let mut write = GraphWrite::new()
            .merge_node(
                node.clone(),
                vec![
                    ("filename", chunk.filename.as_str().into()),
                    ("raw_diff", chunk.raw_diff.as_str().into()),
                    ("summary", chunk.summary.as_str().into()),
                    ("components", meta.components.clone().into()),
                    ("functions", meta.functions.clone().into()),
                    ("test_selectors", meta.test_selectors.clone().into()),
                ],
                vec![("embedding", embedding.into())],
            )
            .merge_relationship(
                NodeRef::new(NodeLabel::AnalysisRun, run_id),
                RelType::Includes,
                node.clone(),
                vec![("order", int(order))],
            );

        for change in &meta.selector_changes {
            let change_node =
                NodeRef::new(NodeLabel::SelectorChange, identity::selector_change_id(change));
            let mut props: Props = vec![
                ("element", change.element.as_str().into()),
                ("attribute", change.attribute.as_str().into()),
            ];
            if let Some(added) = &change.added {
                props.push(("added", added.as_str().into()));
            }
            if let Some(removed) = &change.removed {
                props.push(("removed", removed.as_str().into()));
            }
            write = write
                .merge_node(change_node.clone(), props, vec![])
                .merge_relationship(node.clone(), RelType::HasSelectorChange, change_node, vec![]);
        }

        self.store.execute(write).await?;
        Ok(id)
    }

    fn spec_node_write(spec: &SpecChunk, embedding: Option<&[f32]>) -> (String, GraphWrite) {
        let id = identity::spec_chunk_id(spec);
        let set = embedding
            .map(|e| vec![("embedding", PropValue::from(e))])
            .unwrap_or_default();
        let write = GraphWrite::new().merge_node(
            NodeRef::new(NodeLabel::SpecChunk, id.clone()),
            vec![
                ("test_name", spec.test_name.as_str().into()),
                ("filename", spec.filename.as_str().into()),
                ("body", spec.body.as_str().into()),
            ],
            set,
        );
        (id, write)
    }

    pub async fn merge_spec_chunk(
        &self,
        spec: &SpecChunk,
        embedding: Option<&[f32]>,
    ) -> Result<String> {
        let (id, write) = Self::spec_node_write(spec, embedding);
        self.store.execute(write).await?;
        Ok(id)
    }

    /// Merge a matched spec chunk together with its `MATCHED` edge from an
    /// already persisted changed chunk. Re-matching overwrites the scores.
    pub async fn merge_matched_spec(
        &self,
        chunk_id: &str,
        spec: &SpecChunk,
        embedding: Option<&[f32]>,
        scores: MatchScores,
    ) -> Result<String> {
        let (id, write) = Self::spec_node_write(spec, embedding);
        let write = write.merge_relationship(
            NodeRef::new(NodeLabel::ChangedCodeChunk, chunk_id),
            RelType::Matched,
            NodeRef::new(NodeLabel::SpecChunk, id.clone()),
            match_props(scores),
        );
        self.store.execute(write).await?;
        Ok(id)
    }
}

fn match_props(scores: MatchScores) -> Props {
    vec![
        ("cosine", scores.cosine.into()),
        ("lexical", scores.lexical.into()),
        ("fused", scores.fused.into()),
        ("rank", int(scores.rank)),
    ]
}

// ── Tests ───────────────────────────────────────────────────────────
