// Neo4j backend speaking parameterized Cypher over Bolt.

use std::fmt::Write as _;
use std::time::Duration;

use neo4rs::{ConfigBuilder, Graph, Query, Row, query};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::config::GraphSection;
use crate::error::{ConfigError, StoreError};

use super::schema::{self, NodeLabel, RelType};
use super::{GraphStore, GraphWrite, PropValue, Props, WriteOp};

/// Neo4j-backed implementation of [`GraphStore`].
///
/// The driver pools connections; every acquisition is bounded by
/// `acquire_timeout`. Closing drops the driver, and with it the pool.
pub struct Neo4jStore {
    graph: RwLock<Option<Graph>>,
    acquire_timeout: Duration,
}

impl std::fmt::Debug for Neo4jStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jStore")
            .field("acquire_timeout", &self.acquire_timeout)
            .field("open", &self.graph.try_read().map(|g| g.is_some()).ok())
            .finish_non_exhaustive()
    }
}

impl Neo4jStore {
    /// Connect using the `[graph]` config section. The password is read from
    /// the environment variable named by `password_env`.
    pub async fn connect(section: &GraphSection) -> crate::error::Result<Self> {
        let password = std::env::var(&section.password_env).map_err(|_| {
            ConfigError::Invalid(format!(
                "graph password variable {} is not set",
                section.password_env
            ))
        })?;

        let mut builder = ConfigBuilder::default()
            .uri(section.uri.as_str())
            .user(section.user.as_str())
            .password(password.as_str())
            .max_connections(section.max_connections);
        if let Some(db) = section.database.as_deref() {
            builder = builder.db(db);
        }
        let config = builder.build().map_err(StoreError::Neo4j)?;

        let acquire_timeout = section.acquire_timeout();
        let graph = tokio::time::timeout(acquire_timeout, Graph::connect(config))
            .await
            .map_err(|_| StoreError::AcquireTimeout(acquire_timeout))?
            .map_err(StoreError::Neo4j)?;

        info!(uri = %section.uri, "Connected to Neo4j");
        Ok(Self::from_graph(graph, acquire_timeout))
    }

    fn from_graph(graph: Graph, acquire_timeout: Duration) -> Self {
        Self {
            graph: RwLock::new(Some(graph)),
            acquire_timeout,
        }
    }

    /// A handle on the live driver, or `Closed` once [`GraphStore::close`]
    /// has run.
    async fn handle(&self) -> Result<Graph, StoreError> {
        self.graph.read().await.clone().ok_or(StoreError::Closed)
    }

    /// Run a read query and collect its rows.
    async fn fetch(&self, q: Query) -> crate::error::Result<Vec<Row>> {
        let graph = self.handle().await?;
        let mut stream = tokio::time::timeout(self.acquire_timeout, graph.execute(q))
            .await
            .map_err(|_| StoreError::AcquireTimeout(self.acquire_timeout))?
            .map_err(StoreError::Neo4j)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(StoreError::Neo4j)? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_count(&self, q: Query) -> crate::error::Result<u64> {
        let rows = self.fetch(q).await?;
        let n = rows
            .first()
            .and_then(|row| row.get::<i64>("c").ok())
            .unwrap_or(0);
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

// ── Cypher statements ──────────────────────────────────────────────

/// Cypher text plus its bound parameters. Values never appear in `text`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Statement {
    pub text: String,
    pub params: Vec<(String, PropValue)>,
}

impl Statement {
    fn new(text: String) -> Self {
        Self {
            text,
            params: Vec::new(),
        }
    }

    /// Append `var.key = $pN` assignments for each property.
    fn assign(&mut self, var: &str, props: &Props) -> Vec<String> {
        props
            .iter()
            .map(|(key, value)| {
                let name = format!("p{}", self.params.len());
                self.params.push((name.clone(), value.clone()));
                format!("{var}.{key} = ${name}")
            })
            .collect()
    }

    fn to_query(&self) -> Query {
        self.params
            .iter()
            .fold(query(&self.text), |q, (name, value)| bind(q, name, value))
    }
}

fn bind(q: Query, name: &str, value: &PropValue) -> Query {
    match value {
        PropValue::Str(s) => q.param(name, s.as_str()),
        PropValue::Int(i) => q.param(name, *i),
        PropValue::Float(f) => q.param(name, *f),
        PropValue::Bool(b) => q.param(name, *b),
        PropValue::FloatList(v) => q.param(name, v.clone()),
        PropValue::StrList(v) => q.param(name, v.clone()),
    }
}

pub(crate) fn statement_for(op: &WriteOp) -> Statement {
    match op {
        WriteOp::MergeNode {
            node,
            on_create,
            set,
        } => {
            let mut stmt = Statement::new(String::new());
            stmt.params
                .push(("id".to_string(), PropValue::Str(node.id.clone())));
            let mut create_assignments = stmt.assign("n", on_create);
            create_assignments.push("n.created_at = datetime()".to_string());
            let set_assignments = stmt.assign("n", set);

            let mut text = format!(
                "MERGE (n:{} {{id: $id}}) ON CREATE SET {}",
                node.label,
                create_assignments.join(", ")
            );
            if !set_assignments.is_empty() {
                let _ = write!(text, " SET {}", set_assignments.join(", "));
            }
            stmt.text = text;
            stmt
        }
        WriteOp::CreateNode { node, props } => {
            let mut stmt = Statement::new(String::new());
            stmt.params
                .push(("id".to_string(), PropValue::Str(node.id.clone())));
            let mut assignments = stmt.assign("n", props);
            assignments.push("n.created_at = datetime()".to_string());
            stmt.text = format!(
                "CREATE (n:{} {{id: $id}}) SET {}",
                node.label,
                assignments.join(", ")
            );
            stmt
        }
        WriteOp::MergeRelationship {
            from,
            rel,
            to,
            props,
        } => {
            let mut stmt = Statement::new(String::new());
            stmt.params
                .push(("from".to_string(), PropValue::Str(from.id.clone())));
            stmt.params
                .push(("to".to_string(), PropValue::Str(to.id.clone())));
            let assignments = stmt.assign("r", props);

            let mut text = format!(
                "MATCH (a:{} {{id: $from}}), (b:{} {{id: $to}}) MERGE (a)-[r:{rel}]->(b)",
                from.label, to.label
            );
            if !assignments.is_empty() {
                let _ = write!(text, " SET {}", assignments.join(", "));
            }
            // Zero means an endpoint is missing
            text.push_str(" RETURN count(r) AS c");
            stmt.text = text;
            stmt
        }
    }
}

fn row_to_prop(row: &Row) -> Option<PropValue> {
    if let Ok(v) = row.get::<i64>("v") {
        return Some(PropValue::Int(v));
    }
    if let Ok(v) = row.get::<f64>("v") {
        return Some(PropValue::Float(v));
    }
    if let Ok(v) = row.get::<bool>("v") {
        return Some(PropValue::Bool(v));
    }
    if let Ok(v) = row.get::<String>("v") {
        return Some(PropValue::Str(v));
    }
    if let Ok(v) = row.get::<Vec<String>>("v") {
        return Some(PropValue::StrList(v));
    }
    row.get::<Vec<f64>>("v").ok().map(PropValue::FloatList)
}

#[async_trait::async_trait]
impl GraphStore for Neo4jStore {
    async fn verify_connectivity(&self) -> crate::error::Result<()> {
        self.fetch(query("RETURN 1 AS ok")).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn ensure_constraints(&self) -> crate::error::Result<()> {
        let graph = self.handle().await?;
        for stmt in schema::cypher_constraints() {
            graph
                .run(query(&stmt))
                .await
                .map_err(StoreError::Neo4j)?;
        }
        info!("Neo4j uniqueness constraints in place");
        Ok(())
    }

    async fn close(&self) -> crate::error::Result<()> {
        if self.graph.write().await.take().is_some() {
            info!("Neo4j driver closed");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(ops = write.len()))]
    async fn execute(&self, write: GraphWrite) -> crate::error::Result<()> {
        let graph = self.handle().await?;
        if write.is_empty() {
            return Ok(());
        }

        let mut txn = tokio::time::timeout(self.acquire_timeout, graph.start_txn())
            .await
            .map_err(|_| StoreError::AcquireTimeout(self.acquire_timeout))?
            .map_err(StoreError::Neo4j)?;

        for op in &write.ops {
            let stmt = statement_for(op);
            let mut stream = txn
                .execute(stmt.to_query())
                .await
                .map_err(StoreError::Neo4j)?;
            let mut matched = 0_i64;
            while let Some(row) = stream
                .next(txn.handle())
                .await
                .map_err(StoreError::Neo4j)?
            {
                matched += row.get::<i64>("c").unwrap_or(0);
            }

            if let WriteOp::MergeRelationship { from, to, .. } = op {
                if matched == 0 {
                    txn.rollback().await.map_err(StoreError::Neo4j)?;
                    return Err(StoreError::NodeNotFound {
                        label: format!("{}|{}", from.label, to.label),
                        id: format!("{}|{}", from.id, to.id),
                    }
                    .into());
                }
            }
        }

        txn.commit().await.map_err(StoreError::Neo4j)?;
        debug!(ops = write.len(), "committed graph write");
        Ok(())
    }

    async fn count_nodes(&self, label: NodeLabel) -> crate::error::Result<u64> {
        self.fetch_count(query(&format!("MATCH (n:{label}) RETURN count(n) AS c")))
            .await
    }

    async fn count_relationships(&self, rel: RelType) -> crate::error::Result<u64> {
        self.fetch_count(query(&format!(
            "MATCH ()-[r:{rel}]->() RETURN count(r) AS c"
        )))
        .await
    }

    async fn node_property(
        &self,
        label: NodeLabel,
        id: &str,
        key: &str,
    ) -> crate::error::Result<Option<PropValue>> {
        let q = query(&format!("MATCH (n:{label} {{id: $id}}) RETURN n[$key] AS v"))
            .param("id", id)
            .param("key", key);
        let rows = self.fetch(q).await?;
        Ok(rows.first().and_then(row_to_prop))
    }

    async fn find_nodes(
        &self,
        label: NodeLabel,
        key: &str,
        value: &str,
    ) -> crate::error::Result<Vec<String>> {
        let q = query(&format!(
            "MATCH (n:{label}) WHERE n[$key] = $value RETURN n.id AS id ORDER BY n.created_at, n.id"
        ))
        .param("key", key)
        .param("value", value);
        let rows = self.fetch(q).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get::<String>("id").ok())
            .collect())
    }

    async fn relationship_property(
        &self,
        from_id: &str,
        rel: RelType,
        to_id: &str,
        key: &str,
    ) -> crate::error::Result<Option<PropValue>> {
        let q = query(&format!(
            "MATCH ({{id: $from}})-[r:{rel}]->({{id: $to}}) RETURN r[$key] AS v"
        ))
        .param("from", from_id)
        .param("to", to_id)
        .param("key", key);
        let rows = self.fetch(q).await?;
        Ok(rows.first().and_then(row_to_prop))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
