use anyhow::Context;
use clap::Args;

use breakscope_core::config::BreakscopeConfig;
use breakscope_core::store::{NodeLabel, RelType};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Print counts as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatsArgs, config: &BreakscopeConfig) -> anyhow::Result<()> {
    let repo = super::open_repository(config).await?;
    let store = repo.store();

    let mut nodes = Vec::with_capacity(NodeLabel::ALL.len());
    for label in NodeLabel::ALL {
        let count = store
            .count_nodes(label)
            .await
            .with_context(|| format!("Failed to count {label} nodes"))?;
        nodes.push((label.as_str(), count));
    }
    let mut edges = Vec::with_capacity(RelType::ALL.len());
    for rel in RelType::ALL {
        let count = store
            .count_relationships(rel)
            .await
            .with_context(|| format!("Failed to count {} relationships", rel.as_str()))?;
        edges.push((rel.as_str(), count));
    }
    repo.close().await?;

    if args.json {
        let to_map = |pairs: &[(&str, u64)]| {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
                .collect::<serde_json::Map<_, _>>()
        };
        let out = serde_json::json!({ "nodes": to_map(&nodes), "relationships": to_map(&edges) });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let total_nodes: u64 = nodes.iter().map(|(_, c)| c).sum();
    println!("  Nodes: {total_nodes} total");
    for (label, count) in &nodes {
        println!("    {label:<20} {count:>6}");
    }
    println!();
    let total_edges: u64 = edges.iter().map(|(_, c)| c).sum();
    println!("  Relationships: {total_edges} total");
    for (rel, count) in &edges {
        println!("    {rel:<20} {count:>6}");
    }
    Ok(())
}
