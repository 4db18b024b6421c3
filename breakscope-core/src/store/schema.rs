use std::fmt;

/// Current `SQLite` schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the embedded property graph.
pub const SCHEMA_SQL: &str = r"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS breakscope_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- All nodes; properties are a JSON object
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT NOT NULL,
    label TEXT NOT NULL,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE(id)
);
CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label);

-- Directed, typed relationships; at most one per (from, type, to)
CREATE TABLE IF NOT EXISTS relationships (
    from_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    rel_type TEXT NOT NULL,
    to_id TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    properties TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    UNIQUE(from_id, rel_type, to_id)
);
CREATE INDEX IF NOT EXISTS idx_rel_type ON relationships(rel_type);
CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_id);
";

/// Node labels of the fixed analysis schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeLabel {
    Organization,
    Repository,
    PullRequest,
    AnalysisRun,
    ChangedCodeChunk,
    SpecChunk,
    SelectorChange,
    Prediction,
    PerTestPrediction,
}

impl NodeLabel {
    pub const ALL: [Self; 9] = [
        Self::Organization,
        Self::Repository,
        Self::PullRequest,
        Self::AnalysisRun,
        Self::ChangedCodeChunk,
        Self::SpecChunk,
        Self::SelectorChange,
        Self::Prediction,
        Self::PerTestPrediction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "Organization",
            Self::Repository => "Repository",
            Self::PullRequest => "PullRequest",
            Self::AnalysisRun => "AnalysisRun",
            Self::ChangedCodeChunk => "ChangedCodeChunk",
            Self::SpecChunk => "SpecChunk",
            Self::SelectorChange => "SelectorChange",
            Self::Prediction => "Prediction",
            Self::PerTestPrediction => "PerTestPrediction",
        }
    }

    /// Labels whose `id` is derived from content and merged, not created.
    pub fn is_content_addressed(self) -> bool {
        !matches!(
            self,
            Self::AnalysisRun | Self::Prediction | Self::PerTestPrediction
        )
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types of the fixed analysis schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelType {
    Owns,
    HasPr,
    AnalyzedBy,
    Produced,
    Contains,
    RefersTo,
    Includes,
    HasSelectorChange,
    Matched,
}

impl RelType {
    pub const ALL: [Self; 9] = [
        Self::Owns,
        Self::HasPr,
        Self::AnalyzedBy,
        Self::Produced,
        Self::Contains,
        Self::RefersTo,
        Self::Includes,
        Self::HasSelectorChange,
        Self::Matched,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owns => "OWNS",
            Self::HasPr => "HAS_PR",
            Self::AnalyzedBy => "ANALYZED_BY",
            Self::Produced => "PRODUCED",
            Self::Contains => "CONTAINS",
            Self::RefersTo => "REFERS_TO",
            Self::Includes => "INCLUDES",
            Self::HasSelectorChange => "HAS_SELECTOR_CHANGE",
            Self::Matched => "MATCHED",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cypher statements establishing one `id` uniqueness constraint per
/// content-addressed label. Safe to run repeatedly.
pub fn cypher_constraints() -> Vec<String> {
    NodeLabel::ALL
        .iter()
        .filter(|l| l.is_content_addressed())
        .map(|l| {
            format!(
                "CREATE CONSTRAINT {}_id_unique IF NOT EXISTS FOR (n:{}) REQUIRE n.id IS UNIQUE",
                l.as_str().to_lowercase(),
                l.as_str()
            )
        })
        .collect()
}
