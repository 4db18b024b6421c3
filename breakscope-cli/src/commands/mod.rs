pub mod analyze;
pub mod check;
pub mod matching;
pub mod schema;
pub mod stats;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use breakscope_core::config::{BreakscopeConfig, GraphBackend};
use breakscope_core::repository::GraphRepository;
use breakscope_core::store;
use breakscope_core::types::AnalysisRunInput;

const DEFAULT_CONFIG: &str = "breakscope.toml";

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Establish graph uniqueness constraints (idempotent)
    Schema(schema::SchemaArgs),
    /// Verify the graph store is reachable
    Check(check::CheckArgs),
    /// Rank spec chunks against a run file's changed chunks and print JSON
    Match(matching::MatchArgs),
    /// Embed, match and persist a full analysis run
    Analyze(analyze::AnalyzeArgs),
    /// Node and relationship counts per label/type
    Stats(stats::StatsArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file (default: ./breakscope.toml, built-in defaults if absent)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the SQLite graph location (implies the sqlite backend)
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,
}

pub async fn run(cmd: Command, global: GlobalArgs) -> anyhow::Result<()> {
    let config = load_config(&global)?;
    match cmd {
        Command::Schema(args) => schema::run(args, &config).await,
        Command::Check(args) => check::run(args, &config).await,
        Command::Match(args) => matching::run(args, &config).await,
        Command::Analyze(args) => analyze::run(args, &config).await,
        Command::Stats(args) => stats::run(args, &config).await,
    }
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(global: &GlobalArgs) -> anyhow::Result<BreakscopeConfig> {
    let mut config = match &global.config {
        Some(path) => BreakscopeConfig::load(path)
            .map_err(breakscope_core::error::BreakscopeError::from)
            .with_context(|| format!("Cannot load config: {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            BreakscopeConfig::load(Path::new(DEFAULT_CONFIG))
                .map_err(breakscope_core::error::BreakscopeError::from)
                .context("Cannot load config: breakscope.toml")?
        }
        None => BreakscopeConfig::default(),
    };
    if let Some(db_path) = &global.db_path {
        config.graph.backend = GraphBackend::Sqlite;
        config.graph.sqlite_path = db_path.to_string_lossy().into_owned();
    }
    Ok(config)
}

pub(crate) async fn open_repository(config: &BreakscopeConfig) -> anyhow::Result<GraphRepository> {
    let target = match config.graph.backend {
        GraphBackend::Sqlite => config.graph.sqlite_path.clone(),
        GraphBackend::Neo4j => config.graph.uri.clone(),
    };
    let store = store::connect(&config.graph)
        .await
        .with_context(|| format!("Cannot open graph store: {target}"))?;
    Ok(GraphRepository::new(store))
}

pub(crate) fn read_run_file(path: &Path) -> anyhow::Result<AnalysisRunInput> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read run file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Cannot parse run file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_forces_sqlite() {
        let config = load_config(&GlobalArgs {
            config: None,
            db_path: Some(PathBuf::from("/tmp/x/graph.db")),
        })
        .unwrap();
        assert_eq!(config.graph.backend, GraphBackend::Sqlite);
        assert_eq!(config.graph.sqlite_path, "/tmp/x/graph.db");
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = load_config(&GlobalArgs {
            config: Some(PathBuf::from("/nonexistent/breakscope.toml")),
            db_path: None,
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("Cannot load config"));
    }
}
