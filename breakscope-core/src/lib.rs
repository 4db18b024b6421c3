//! Breakscope core library — hybrid test-impact retrieval and graph persistence.
//!
//! The main entry point is [`pipeline::AnalysisPipeline`], which embeds a
//! diff's changed chunks and the repository's spec chunks, fuses lexical and
//! dense rankings, and records the run in a [`store::GraphStore`].

pub mod config;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod pipeline;
pub mod predictions;
pub mod repository;
pub mod retrieval;
pub mod store;
pub mod types;
