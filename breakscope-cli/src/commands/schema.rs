use anyhow::Context;
use clap::Args;

use breakscope_core::config::BreakscopeConfig;

#[derive(Args, Debug)]
pub struct SchemaArgs {}

pub async fn run(_args: SchemaArgs, config: &BreakscopeConfig) -> anyhow::Result<()> {
    let repo = super::open_repository(config).await?;
    repo.ensure_constraints()
        .await
        .context("Failed to establish graph constraints")?;
    repo.close().await?;
    println!("Graph constraints in place");
    Ok(())
}
