use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which property-graph backend a run writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    /// Embedded `SQLite` property graph.
    #[default]
    Sqlite,
    /// Neo4j over Bolt.
    Neo4j,
}

/// Top-level breakscope configuration, matching `breakscope.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakscopeConfig {
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
}

impl BreakscopeConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be > 0".into()));
        }
        if self.retrieval.rrf_k <= 0.0 {
            return Err(ConfigError::Invalid("retrieval.rrf_k must be > 0".into()));
        }
        if self.retrieval.name_boost <= 0.0 {
            return Err(ConfigError::Invalid(
                "retrieval.name_boost must be > 0".into(),
            ));
        }
        if self.graph.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "graph.max_connections must be > 0".into(),
            ));
        }
        if self.graph.acquire_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "graph.acquire_timeout_secs must be > 0".into(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    pub backend: GraphBackend,
    pub sqlite_path: String,
    pub uri: String,
    pub user: String,
    /// Name of the environment variable holding the Neo4j password.
    pub password_env: String,
    pub database: Option<String>,
    pub max_connections: usize,
    pub acquire_timeout_secs: u64,
}

impl GraphSection {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Sqlite,
            sqlite_path: ".breakscope/graph.db".to_string(),
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password_env: "NEO4J_PASSWORD".to_string(),
            database: None,
            max_connections: 16,
            acquire_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    pub top_k: usize,
    pub rrf_k: f64,
    /// Weight of the test-name field relative to the body.
    pub name_boost: f64,
    /// Largest edit distance a fuzzy term match may span.
    pub max_edit_distance: usize,
    /// Query terms shorter than this only match exactly.
    pub min_fuzzy_term_len: usize,
    pub bm25_k1: f64,
    pub bm25_b: f64,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: 3,
            rrf_k: 60.0,
            name_boost: 2.0,
            max_edit_distance: 1,
            min_fuzzy_term_len: 4,
            bm25_k1: 1.2,
            bm25_b: 0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub batch_size: usize,
    /// Expected dimensionality; responses of any other size are rejected.
    pub dimensions: Option<usize>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 64,
            dimensions: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = BreakscopeConfig::from_toml("").unwrap();
        assert_eq!(config.graph.backend, GraphBackend::Sqlite);
        assert_eq!(config.graph.acquire_timeout(), Duration::from_secs(10));
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.rrf_k - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = BreakscopeConfig::from_toml(
            r#"
            [graph]
            backend = "neo4j"
            uri = "bolt://graph:7687"

            [retrieval]
            top_k = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
        assert_eq!(config.graph.uri, "bolt://graph:7687");
        assert_eq!(config.graph.max_connections, 16);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.max_edit_distance, 1);
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let err = BreakscopeConfig::from_toml("[retrieval]\ntop_k = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = BreakscopeConfig::from_toml("[graph\nbackend=").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = BreakscopeConfig::load(Path::new("/nonexistent/breakscope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
