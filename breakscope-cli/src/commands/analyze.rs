use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tracing::info;

use breakscope_core::config::BreakscopeConfig;
use breakscope_core::embedding::openai::OpenAiEmbedder;
use breakscope_core::pipeline::AnalysisPipeline;

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// JSON run file
    pub run_file: PathBuf,

    /// Upper bound on concurrent chunk writes
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Include the run summary in the output
    #[arg(long)]
    pub summary: bool,
}

pub async fn run(args: AnalyzeArgs, config: &BreakscopeConfig) -> anyhow::Result<()> {
    let input = super::read_run_file(&args.run_file)?;
    let embedder = Arc::new(OpenAiEmbedder::from_config(&config.embedding)?);

    let repo = super::open_repository(config).await?;
    repo.ensure_constraints()
        .await
        .context("Failed to establish graph constraints")?;

    let mut pipeline = AnalysisPipeline::new(repo.clone(), embedder, config);
    if let Some(n) = args.concurrency {
        pipeline = pipeline.with_concurrency(n);
    }

    let result = pipeline.run(&input).await;
    repo.close().await?;
    let (ids, summary) = result.context("Cannot persist analysis run")?;
    info!(run_id = %ids.run_id, prediction_id = %ids.prediction_id, "Run recorded");

    let out = if args.summary {
        serde_json::json!({ "runId": ids.run_id, "predictionId": ids.prediction_id, "summary": summary })
    } else {
        serde_json::to_value(&ids)?
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
