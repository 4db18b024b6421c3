/// Top-level breakscope error type.
///
/// All fallible operations in `breakscope-core` return [`Result<T, BreakscopeError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum BreakscopeError {
    /// Error from the property-graph store layer (`SQLite` or Neo4j).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error from the embedding service.
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Malformed caller input, detected before any I/O.
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BreakscopeError {
    /// `true` when a collaborator (graph store, embedding service) could not be
    /// reached or failed mid-call. Retry policy belongs to the caller.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_unavailable(),
            Self::Embedding(e) => matches!(
                e,
                EmbeddingError::Network(_) | EmbeddingError::ApiError { .. }
            ),
            Self::Input(_) | Self::Config(_) => false,
        }
    }
}

/// Errors from the graph store backends.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Underlying Neo4j driver operation failed.
    #[error("Neo4j error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    /// No connection became available within the configured wait.
    #[error("Timed out after {0:?} waiting for a graph connection")]
    AcquireTimeout(std::time::Duration),

    /// A relationship endpoint does not exist in the store.
    #[error("Node not found: {label} {id}")]
    NodeNotFound {
        /// Label of the missing endpoint.
        label: String,
        /// Identifier of the missing endpoint.
        id: String,
    },

    /// The store was closed and can no longer serve requests.
    #[error("Graph store is closed")]
    Closed,

    /// Filesystem error preparing the store location.
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization of a property failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Neo4j(_) | Self::AcquireTimeout(_) | Self::Closed | Self::Io(_)
        ) || matches!(
            self,
            Self::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                )
        )
    }
}

/// Errors from embedding provider interactions.
#[derive(thiserror::Error, Debug)]
pub enum EmbeddingError {
    /// Network-level failure connecting to the embedding provider.
    #[error("Network error: {0}")]
    Network(String),

    /// Embedding API returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    ApiError {
        /// HTTP status code from the provider.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Response could not be parsed into the expected format.
    #[error("Response parse error: {0}")]
    Parse(String),

    /// Provider configuration is missing or invalid (API key, model, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider returned a different number of vectors than inputs.
    #[error("Expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// Vectors in one response do not share the model's dimensionality.
    #[error("Embedding dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Malformed input rejected synchronously, before any I/O is attempted.
#[derive(thiserror::Error, Debug)]
pub enum InputError {
    /// Two vectors that must share dimensionality do not.
    #[error("Vector dimensionality mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A field the operation cannot proceed without is empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Number of embeddings does not line up with the chunks they belong to.
    #[error("{what}: expected {expected} entries, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors in breakscope configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convenience alias for `Result<T, BreakscopeError>`.
pub type Result<T> = std::result::Result<T, BreakscopeError>;
