use anyhow::Context;
use clap::Args;

use breakscope_core::config::{BreakscopeConfig, GraphBackend};

#[derive(Args, Debug)]
pub struct CheckArgs {}

pub async fn run(_args: CheckArgs, config: &BreakscopeConfig) -> anyhow::Result<()> {
    let repo = super::open_repository(config).await?;
    repo.verify_connectivity()
        .await
        .context("Graph store is unreachable")?;
    repo.close().await?;
    match config.graph.backend {
        GraphBackend::Sqlite => println!("OK sqlite {}", config.graph.sqlite_path),
        GraphBackend::Neo4j => println!("OK neo4j {}", config.graph.uri),
    }
    Ok(())
}
