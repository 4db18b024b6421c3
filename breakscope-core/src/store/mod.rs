pub mod neo4j;
pub mod schema;
pub mod sqlite;

pub use neo4j::Neo4jStore;
pub use schema::{NodeLabel, RelType};
pub use sqlite::SqliteGraphStore;

use std::sync::Arc;

use crate::config::{GraphBackend, GraphSection};

/// A typed property value. Integers stay 64-bit on every backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&[f32]> for PropValue {
    fn from(v: &[f32]) -> Self {
        Self::FloatList(v.iter().map(|&x| f64::from(x)).collect())
    }
}

impl From<Vec<String>> for PropValue {
    fn from(v: Vec<String>) -> Self {
        Self::StrList(v)
    }
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Ordered property list. Keys are static schema names, never caller input.
pub type Props = Vec<(&'static str, PropValue)>;

/// Endpoint of a relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub label: NodeLabel,
    pub id: String,
}

impl NodeRef {
    pub fn new(label: NodeLabel, id: impl Into<String>) -> Self {
        Self {
            label,
            id: id.into(),
        }
    }
}

/// One operation inside a [`GraphWrite`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create the node if absent. `on_create` is only written on creation;
    /// `set` is written every time.
    MergeNode {
        node: NodeRef,
        on_create: Props,
        set: Props,
    },
    /// Always insert a new node.
    CreateNode { node: NodeRef, props: Props },
    /// Create the relationship if absent, then overwrite `props`.
    /// Both endpoints must already exist.
    MergeRelationship {
        from: NodeRef,
        rel: RelType,
        to: NodeRef,
        props: Props,
    },
}

/// Operations committed together in one transaction, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphWrite {
    pub ops: Vec<WriteOp>,
}

impl GraphWrite {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn merge_node(mut self, node: NodeRef, on_create: Props, set: Props) -> Self {
        self.ops.push(WriteOp::MergeNode {
            node,
            on_create,
            set,
        });
        self
    }

    #[must_use]
    pub fn create_node(mut self, node: NodeRef, props: Props) -> Self {
        self.ops.push(WriteOp::CreateNode { node, props });
        self
    }

    #[must_use]
    pub fn merge_relationship(
        mut self,
        from: NodeRef,
        rel: RelType,
        to: NodeRef,
        props: Props,
    ) -> Self {
        self.ops.push(WriteOp::MergeRelationship {
            from,
            rel,
            to,
            props,
        });
        self
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Property-graph backend. Every analysis write goes through this trait.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync + std::fmt::Debug {
    // ── Lifecycle ──────────────────────────────────────────────────

    /// Round-trip a trivial query to prove the store is reachable.
    async fn verify_connectivity(&self) -> crate::error::Result<()>;

    /// Establish `id` uniqueness per content-addressed label. Idempotent.
    async fn ensure_constraints(&self) -> crate::error::Result<()>;

    /// Release connections. Later calls fail with `StoreError::Closed`.
    async fn close(&self) -> crate::error::Result<()>;

    // ── Writes ─────────────────────────────────────────────────────

    /// Apply every op of `write` in a single transaction.
    async fn execute(&self, write: GraphWrite) -> crate::error::Result<()>;

    // ── Reads ──────────────────────────────────────────────────────

    async fn count_nodes(&self, label: NodeLabel) -> crate::error::Result<u64>;

    async fn count_relationships(&self, rel: RelType) -> crate::error::Result<u64>;

    /// A node property, or `None` when the node or the key is absent.
    async fn node_property(
        &self,
        label: NodeLabel,
        id: &str,
        key: &str,
    ) -> crate::error::Result<Option<PropValue>>;

    /// IDs of `label` nodes whose string property `key` equals `value`.
    async fn find_nodes(
        &self,
        label: NodeLabel,
        key: &str,
        value: &str,
    ) -> crate::error::Result<Vec<String>>;

    /// A relationship property, or `None` when the edge or the key is absent.
    async fn relationship_property(
        &self,
        from_id: &str,
        rel: RelType,
        to_id: &str,
        key: &str,
    ) -> crate::error::Result<Option<PropValue>>;
}

/// Open the backend selected in config.
pub async fn connect(section: &GraphSection) -> crate::error::Result<Arc<dyn GraphStore>> {
    match section.backend {
        GraphBackend::Sqlite => {
            let path = std::path::Path::new(&section.sqlite_path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::StoreError::Io(format!("{}: {e}", parent.display()))
                })?;
            }
            let store = SqliteGraphStore::open(path)?.with_acquire_timeout(section.acquire_timeout());
            Ok(Arc::new(store))
        }
        GraphBackend::Neo4j => Ok(Arc::new(Neo4jStore::connect(section).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_op_order() {
        let write = GraphWrite::new()
            .merge_node(NodeRef::new(NodeLabel::SpecChunk, "s"), vec![], vec![])
            .create_node(NodeRef::new(NodeLabel::AnalysisRun, "r"), vec![])
            .merge_relationship(
                NodeRef::new(NodeLabel::AnalysisRun, "r"),
                RelType::Includes,
                NodeRef::new(NodeLabel::SpecChunk, "s"),
                vec![("order", PropValue::Int(0))],
            );
        assert_eq!(write.len(), 3);
        assert!(matches!(write.ops[0], WriteOp::MergeNode { .. }));
        assert!(matches!(write.ops[2], WriteOp::MergeRelationship { .. }));
    }

    #[test]
    fn embedding_widens_to_f64() {
        let v: PropValue = [0.5_f32, -1.0].as_slice().into();
        assert_eq!(v, PropValue::FloatList(vec![0.5, -1.0]));
    }

    #[test]
    fn large_integers_stay_exact() {
        let big = (1_i64 << 53) + 1;
        assert_eq!(PropValue::from(big).as_i64(), Some(big));
    }

    #[tokio::test]
    async fn connect_creates_sqlite_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let section = GraphSection {
            sqlite_path: dir
                .path()
                .join("nested/graph.db")
                .to_string_lossy()
                .into_owned(),
            ..GraphSection::default()
        };
        let store = connect(&section).await.unwrap();
        store.verify_connectivity().await.unwrap();
        assert!(dir.path().join("nested/graph.db").exists());
    }
}
