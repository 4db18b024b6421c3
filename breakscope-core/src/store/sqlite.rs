use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::error::StoreError;

use super::schema::{self, NodeLabel, RelType};
use super::{GraphStore, GraphWrite, NodeRef, PropValue, Props, WriteOp};

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Embedded `SQLite` property graph implementing [`GraphStore`].
///
/// Nodes and relationships carry their properties as JSON objects. Node IDs
/// and `(from, type, to)` triples are unique, so merges are single upserts.
#[derive(Debug)]
pub struct SqliteGraphStore {
    conn: Mutex<Option<Connection>>,
    db_path: Option<PathBuf>,
    acquire_timeout: Duration,
}

impl SqliteGraphStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, db_path: Option<PathBuf>) -> crate::error::Result<Self> {
        Self::initialize(&conn).map_err(StoreError::Sqlite)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        })
    }

    /// Bound the wait for the connection before failing with
    /// [`StoreError::AcquireTimeout`].
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        // Silently ignored for in-memory databases
        let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

        conn.execute_batch(schema::SCHEMA_SQL)?;
        conn.execute(
            "INSERT OR IGNORE INTO breakscope_meta (key, value) VALUES ('schema_version', ?1)",
            params![schema::SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Run `f` against the connection once it is free, or time out.
    async fn with_conn<T, F>(&self, f: F) -> crate::error::Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut guard = tokio::time::timeout(self.acquire_timeout, self.conn.lock())
            .await
            .map_err(|_| StoreError::AcquireTimeout(self.acquire_timeout))?;
        let conn = guard.as_mut().ok_or(StoreError::Closed)?;
        Ok(f(conn)?)
    }

    fn apply(tx: &Transaction<'_>, op: &WriteOp, now: &str) -> Result<(), StoreError> {
        match op {
            WriteOp::MergeNode {
                node,
                on_create,
                set,
            } => {
                let mut initial = props_to_json(on_create);
                initial.extend(props_to_json(set));
                tx.execute(
                    "INSERT INTO nodes (id, label, properties, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO NOTHING",
                    params![
                        node.id,
                        node.label.as_str(),
                        Value::Object(initial).to_string(),
                        now
                    ],
                )?;
                if !set.is_empty() {
                    tx.execute(
                        "UPDATE nodes SET properties = json_patch(properties, ?2) WHERE id = ?1",
                        params![node.id, Value::Object(props_to_json(set)).to_string()],
                    )?;
                }
            }
            WriteOp::CreateNode { node, props } => {
                tx.execute(
                    "INSERT INTO nodes (id, label, properties, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        node.id,
                        node.label.as_str(),
                        Value::Object(props_to_json(props)).to_string(),
                        now
                    ],
                )?;
            }
            WriteOp::MergeRelationship {
                from,
                rel,
                to,
                props,
            } => {
                Self::require_node(tx, from)?;
                Self::require_node(tx, to)?;
                tx.execute(
                    "INSERT INTO relationships (from_id, rel_type, to_id, properties, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(from_id, rel_type, to_id) DO UPDATE SET
                        properties = json_patch(relationships.properties, excluded.properties)",
                    params![
                        from.id,
                        rel.as_str(),
                        to.id,
                        Value::Object(props_to_json(props)).to_string(),
                        now
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn require_node(tx: &Transaction<'_>, node: &NodeRef) -> Result<(), StoreError> {
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1 AND label = ?2)",
            params![node.id, node.label.as_str()],
            |row| row.get(0),
        )?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::NodeNotFound {
                label: node.label.to_string(),
                id: node.id.clone(),
            })
        }
    }
}

#[async_trait::async_trait]
impl GraphStore for SqliteGraphStore {
    async fn verify_connectivity(&self) -> crate::error::Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn ensure_constraints(&self) -> crate::error::Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(schema::SCHEMA_SQL)?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> crate::error::Result<()> {
        let mut guard = tokio::time::timeout(self.acquire_timeout, self.conn.lock())
            .await
            .map_err(|_| StoreError::AcquireTimeout(self.acquire_timeout))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(ops = write.len()))]
    async fn execute(&self, write: GraphWrite) -> crate::error::Result<()> {
        if write.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            for op in &write.ops {
                Self::apply(&tx, op, &now)?;
            }
            tx.commit()?;
            debug!(ops = write.len(), "committed graph write");
            Ok(())
        })
        .await
    }

    #[allow(clippy::cast_sign_loss)]
    async fn count_nodes(&self, label: NodeLabel) -> crate::error::Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE label = ?1",
                params![label.as_str()],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    #[allow(clippy::cast_sign_loss)]
    async fn count_relationships(&self, rel: RelType) -> crate::error::Result<u64> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM relationships WHERE rel_type = ?1",
                params![rel.as_str()],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
        .await
    }

    async fn node_property(
        &self,
        label: NodeLabel,
        id: &str,
        key: &str,
    ) -> crate::error::Result<Option<PropValue>> {
        let (id, key) = (id.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT properties FROM nodes WHERE id = ?1 AND label = ?2",
                    params![id, label.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            lookup(raw.as_deref(), &key)
        })
        .await
    }

    async fn find_nodes(
        &self,
        label: NodeLabel,
        key: &str,
        value: &str,
    ) -> crate::error::Result<Vec<String>> {
        let (path, value) = (format!("$.{key}"), value.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM nodes
                 WHERE label = ?1 AND json_extract(properties, ?2) = ?3
                 ORDER BY created_at, id",
            )?;
            let ids = stmt
                .query_map(params![label.as_str(), path, value], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(ids)
        })
        .await
    }

    async fn relationship_property(
        &self,
        from_id: &str,
        rel: RelType,
        to_id: &str,
        key: &str,
    ) -> crate::error::Result<Option<PropValue>> {
        let (from_id, to_id, key) = (from_id.to_string(), to_id.to_string(), key.to_string());
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT properties FROM relationships
                     WHERE from_id = ?1 AND rel_type = ?2 AND to_id = ?3",
                    params![from_id, rel.as_str(), to_id],
                    |row| row.get(0),
                )
                .optional()?;
            lookup(raw.as_deref(), &key)
        })
        .await
    }
}

// ── JSON property encoding ─────────────────────────────────────────

fn props_to_json(props: &Props) -> Map<String, Value> {
    props
        .iter()
        .map(|(k, v)| ((*k).to_string(), prop_to_json(v)))
        .collect()
}

fn prop_to_json(value: &PropValue) -> Value {
    match value {
        PropValue::Str(s) => Value::from(s.as_str()),
        PropValue::Int(i) => Value::from(*i),
        PropValue::Float(f) => Value::from(*f),
        PropValue::Bool(b) => Value::from(*b),
        PropValue::FloatList(v) => Value::from(v.clone()),
        PropValue::StrList(v) => Value::from(v.clone()),
    }
}

fn prop_from_json(value: Value) -> Option<PropValue> {
    match value {
        Value::String(s) => Some(PropValue::Str(s)),
        Value::Bool(b) => Some(PropValue::Bool(b)),
        Value::Number(n) => n
            .as_i64()
            .map(PropValue::Int)
            .or_else(|| n.as_f64().map(PropValue::Float)),
        Value::Array(items) if items.iter().all(Value::is_string) => Some(PropValue::StrList(
            items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )),
        Value::Array(items) => items
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<_>>>()
            .map(PropValue::FloatList),
        Value::Null | Value::Object(_) => None,
    }
}

fn lookup(raw: Option<&str>, key: &str) -> Result<Option<PropValue>, StoreError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mut props: Map<String, Value> = serde_json::from_str(raw)?;
    Ok(props.remove(key).and_then(prop_from_json))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BreakscopeError;
    use std::sync::Arc;

    fn chunk(id: &str) -> NodeRef {
        NodeRef::new(NodeLabel::ChangedCodeChunk, id)
    }

    fn spec(id: &str) -> NodeRef {
        NodeRef::new(NodeLabel::SpecChunk, id)
    }

    fn merge_chunk(id: &str, filename: &str) -> GraphWrite {
        GraphWrite::new().merge_node(
            chunk(id),
            vec![("filename", PropValue::from(filename))],
            vec![],
        )
    }

    #[tokio::test]
    async fn merging_twice_leaves_one_node() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.execute(merge_chunk("abc", "a.tsx")).await.unwrap();
        store.execute(merge_chunk("abc", "a.tsx")).await.unwrap();
        assert_eq!(store.count_nodes(NodeLabel::ChangedCodeChunk).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn on_create_props_survive_remerge_and_set_props_update() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let write = |name: &str, seen: i64| {
            GraphWrite::new().merge_node(
                NodeRef::new(NodeLabel::Organization, "org1"),
                vec![("name", PropValue::from(name))],
                vec![("last_seen", PropValue::Int(seen))],
            )
        };
        store.execute(write("acme", 1)).await.unwrap();
        store.execute(write("renamed", 2)).await.unwrap();

        let name = store
            .node_property(NodeLabel::Organization, "org1", "name")
            .await
            .unwrap();
        assert_eq!(name, Some(PropValue::from("acme")));
        let seen = store
            .node_property(NodeLabel::Organization, "org1", "last_seen")
            .await
            .unwrap();
        assert_eq!(seen, Some(PropValue::Int(2)));
    }

    #[tokio::test]
    async fn remerged_relationship_overwrites_scores() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let matched = |fused: f64| {
            GraphWrite::new()
                .merge_node(chunk("c"), vec![], vec![])
                .merge_node(spec("s"), vec![], vec![])
                .merge_relationship(
                    chunk("c"),
                    RelType::Matched,
                    spec("s"),
                    vec![("fused", PropValue::Float(fused))],
                )
        };
        store.execute(matched(0.03)).await.unwrap();
        store.execute(matched(0.02)).await.unwrap();

        assert_eq!(store.count_relationships(RelType::Matched).await.unwrap(), 1);
        let fused = store
            .relationship_property("c", RelType::Matched, "s", "fused")
            .await
            .unwrap();
        assert_eq!(fused, Some(PropValue::Float(0.02)));
    }

    #[tokio::test]
    async fn missing_endpoint_rolls_back_whole_write() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let write = merge_chunk("c", "a.tsx").merge_relationship(
            chunk("c"),
            RelType::Matched,
            spec("nope"),
            vec![],
        );
        let err = store.execute(write).await.unwrap_err();
        assert!(matches!(
            err,
            BreakscopeError::Store(StoreError::NodeNotFound { .. })
        ));
        assert_eq!(store.count_nodes(NodeLabel::ChangedCodeChunk).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_node_rejects_duplicate_id() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let run = || {
            GraphWrite::new().create_node(NodeRef::new(NodeLabel::AnalysisRun, "r1"), vec![])
        };
        store.execute(run()).await.unwrap();
        assert!(store.execute(run()).await.is_err());
        assert_eq!(store.count_nodes(NodeLabel::AnalysisRun).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn integers_above_2_pow_53_round_trip_exactly() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let big = (1_i64 << 53) + 1;
        store
            .execute(GraphWrite::new().create_node(
                NodeRef::new(NodeLabel::Prediction, "p"),
                vec![("broken", PropValue::Int(big))],
            ))
            .await
            .unwrap();
        let v = store
            .node_property(NodeLabel::Prediction, "p", "broken")
            .await
            .unwrap();
        assert_eq!(v.and_then(|v| v.as_i64()), Some(big));
    }

    #[tokio::test]
    async fn embedding_round_trips_as_float_list() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .execute(GraphWrite::new().merge_node(
                chunk("c"),
                vec![("embedding", PropValue::FloatList(vec![0.25, -1.5]))],
                vec![],
            ))
            .await
            .unwrap();
        let v = store
            .node_property(NodeLabel::ChangedCodeChunk, "c", "embedding")
            .await
            .unwrap();
        assert_eq!(v, Some(PropValue::FloatList(vec![0.25, -1.5])));
    }

    #[tokio::test]
    async fn absent_node_or_key_reads_none() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.execute(merge_chunk("c", "a.tsx")).await.unwrap();
        let missing = store
            .node_property(NodeLabel::ChangedCodeChunk, "zzz", "filename")
            .await
            .unwrap();
        assert!(missing.is_none());
        let no_key = store
            .node_property(NodeLabel::ChangedCodeChunk, "c", "summary")
            .await
            .unwrap();
        assert!(no_key.is_none());
    }

    #[tokio::test]
    async fn find_nodes_by_string_property() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.execute(merge_chunk("c1", "a.tsx")).await.unwrap();
        store.execute(merge_chunk("c2", "b.tsx")).await.unwrap();
        let ids = store
            .find_nodes(NodeLabel::ChangedCodeChunk, "filename", "b.tsx")
            .await
            .unwrap();
        assert_eq!(ids, vec!["c2".to_string()]);
        assert!(
            store
                .find_nodes(NodeLabel::SpecChunk, "filename", "b.tsx")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn closed_store_refuses_work() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.verify_connectivity().await.unwrap();
        store.close().await.unwrap();
        let err = store.verify_connectivity().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(matches!(err, BreakscopeError::Store(StoreError::Closed)));
    }

    #[tokio::test]
    async fn held_connection_times_out_acquisition() {
        let store = SqliteGraphStore::in_memory()
            .unwrap()
            .with_acquire_timeout(Duration::from_millis(50));
        let _held = store.conn.lock().await;
        let err = store.count_nodes(NodeLabel::SpecChunk).await.unwrap_err();
        assert!(matches!(
            err,
            BreakscopeError::Store(StoreError::AcquireTimeout(_))
        ));
    }

    #[tokio::test]
    async fn ensure_constraints_is_idempotent() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store.ensure_constraints().await.unwrap();
        store.ensure_constraints().await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_merges_of_same_id_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteGraphStore::open(&dir.path().join("graph.db")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .execute(
                            GraphWrite::new()
                                .merge_node(spec("same"), vec![], vec![])
                                .merge_node(chunk("c"), vec![], vec![])
                                .merge_relationship(chunk("c"), RelType::Matched, spec("same"), vec![]),
                        )
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.count_nodes(NodeLabel::SpecChunk).await.unwrap(), 1);
        assert_eq!(store.count_relationships(RelType::Matched).await.unwrap(), 1);
    }
}
