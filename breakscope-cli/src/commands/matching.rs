use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use breakscope_core::config::BreakscopeConfig;
use breakscope_core::embedding::openai::OpenAiEmbedder;
use breakscope_core::error::BreakscopeError;
use breakscope_core::pipeline::embed_inputs;
use breakscope_core::retrieval::HybridMatcher;

#[derive(Args, Debug)]
pub struct MatchArgs {
    /// JSON run file (same shape `analyze` accepts)
    pub run_file: PathBuf,

    /// Override retrieval.top_k
    #[arg(long)]
    pub top_k: Option<usize>,
}

pub async fn run(args: MatchArgs, config: &BreakscopeConfig) -> anyhow::Result<()> {
    let input = super::read_run_file(&args.run_file)?;
    let specs = input.spec_chunks();

    let embedder = OpenAiEmbedder::from_config(&config.embedding)?;
    let embedded = embed_inputs(&embedder, &input.ast_chunks, &specs)
        .await
        .context("Failed to embed run inputs")?;

    let mut matcher = HybridMatcher::from_config(&config.retrieval);
    if let Some(top_k) = args.top_k {
        matcher = matcher.with_top_k(top_k);
    }
    let matches = matcher
        .match_chunks_detailed(
            &input.ast_chunks,
            &embedded.chunk_vectors,
            &specs,
            &embedded.spec_vectors,
        )
        .map_err(BreakscopeError::from)?;

    println!("{}", serde_json::to_string_pretty(&matches)?);
    Ok(())
}
