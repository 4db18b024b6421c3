// Integration test fixtures for breakscope: sample runs, stub embedders, stores.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};

use breakscope_core::config::BreakscopeConfig;
use breakscope_core::embedding::Embedder;
use breakscope_core::error::Result;
use breakscope_core::pipeline::AnalysisPipeline;
use breakscope_core::repository::GraphRepository;
use breakscope_core::store::{GraphStore, SqliteGraphStore};
use breakscope_core::types::{
    AnalysisRunInput, ChangedCodeChunk, ChunkMetadata, PrMetadata, PredictionStatus,
    SelectorChange, SpecChunk, SpecFile, UpstreamPrediction,
};

/// Width of [`HashingEmbedder`] vectors.
pub const STUB_DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase token bumps one of
/// [`STUB_DIMENSIONS`] buckets. Counts how many batches it served.
#[derive(Debug, Default)]
pub struct HashingEmbedder {
    calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0_f32; STUB_DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (hasher.finish() % STUB_DIMENSIONS as u64) as usize;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait::async_trait]
impl Embedder for HashingEmbedder {
    #[allow(clippy::unnecessary_literal_bound)]
    fn model_id(&self) -> &str {
        "stub-hashing"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Fresh in-memory `SQLite` graph with constraints in place.
pub async fn memory_store() -> Arc<dyn GraphStore> {
    let store = SqliteGraphStore::in_memory().expect("open in-memory graph");
    store.ensure_constraints().await.expect("constraints");
    Arc::new(store)
}

/// Pipeline over `store` with the stub embedder and default retrieval.
pub fn pipeline(store: Arc<dyn GraphStore>, embedder: Arc<HashingEmbedder>) -> AnalysisPipeline {
    AnalysisPipeline::new(
        GraphRepository::new(store),
        embedder,
        &BreakscopeConfig::default(),
    )
}

fn spec(file: &str, name: &str, body: &str) -> SpecChunk {
    SpecChunk {
        test_name: name.into(),
        filename: file.into(),
        body: body.into(),
    }
}

pub const CHECKOUT_SPEC: &str = "cypress/e2e/checkout.cy.ts";
pub const AUTH_SPEC: &str = "cypress/e2e/auth.cy.ts";

/// A checkout PR: one chunk renames the pay button's test id, one touches
/// the header. Five tests across two spec files.
pub fn sample_run() -> AnalysisRunInput {
    let checkout = ChangedCodeChunk {
        filename: "src/components/Checkout.tsx".into(),
        raw_diff: "-  <button data-testid=\"pay-btn\" onClick={pay}>Pay</button>\n\
                   +  <button data-testid=\"checkout-btn\" onClick={pay}>Pay now</button>"
            .into(),
        metadata: ChunkMetadata {
            components: vec!["Checkout".into()],
            functions: vec!["pay".into()],
            selector_changes: vec![SelectorChange {
                element: "button".into(),
                attribute: "data-testid".into(),
                added: Some("checkout-btn".into()),
                removed: Some("pay-btn".into()),
            }],
            test_selectors: vec!["checkout-btn".into()],
        },
        summary: "Renames the pay button and its test id".into(),
    };
    let header = ChangedCodeChunk {
        filename: "src/components/Header.tsx".into(),
        raw_diff: "-  <a href=\"/login\">Sign in</a>\n+  <a href=\"/login\" data-cy=\"login-link\">Log in</a>"
            .into(),
        metadata: ChunkMetadata {
            components: vec!["Header".into()],
            functions: Vec::new(),
            selector_changes: Vec::new(),
            test_selectors: vec!["login-link".into()],
        },
        summary: "Header login link copy".into(),
    };

    let checkout_tests = vec![
        spec(
            CHECKOUT_SPEC,
            "pays with card",
            "it('pays with card', () => {\n  cy.get('[data-testid=pay-btn]').click();\n  cy.contains('Thank you');\n});",
        ),
        spec(
            CHECKOUT_SPEC,
            "applies coupon",
            "it('applies coupon', () => {\n  cy.get('[data-testid=coupon]').type('SAVE10');\n});",
        ),
        spec(
            CHECKOUT_SPEC,
            "shows cart total",
            "it('shows cart total', () => {\n  cy.get('[data-testid=total]').should('contain', '$');\n});",
        ),
    ];
    let auth_tests = vec![
        spec(
            AUTH_SPEC,
            "logs in",
            "it('logs in', () => {\n  cy.contains('Sign in').click();\n  cy.get('#email').type('a@b.c');\n});",
        ),
        spec(
            AUTH_SPEC,
            "logs out",
            "it('logs out', () => {\n  cy.get('[data-cy=logout]').click();\n});",
        ),
    ];

    AnalysisRunInput {
        org_name: "acme".into(),
        repo_full_name: "acme/shop".into(),
        pr_metadata: PrMetadata {
            number: 128,
            title: "Rename pay button".into(),
            author: "dev".into(),
            base_branch: "main".into(),
            head_branch: "rename-pay".into(),
            head_sha: "3f2a9c1".into(),
            url: "https://example.com/acme/shop/pull/128".into(),
        },
        ast_chunks: vec![checkout, header],
        spec_files: vec![
            SpecFile {
                filename: CHECKOUT_SPEC.into(),
                chunks: checkout_tests,
            },
            SpecFile {
                filename: AUTH_SPEC.into(),
                chunks: auth_tests,
            },
        ],
        raw_markdown: SAMPLE_MARKDOWN.into(),
        predictions: vec![
            UpstreamPrediction {
                test: "pays with card".into(),
                file: CHECKOUT_SPEC.into(),
                status: PredictionStatus::Broken,
                reason: "data-testid pay-btn was renamed".into(),
            },
            UpstreamPrediction {
                test: "logs in".into(),
                file: String::new(),
                status: PredictionStatus::Risk,
                reason: "link text changed".into(),
            },
            UpstreamPrediction {
                test: "applies coupon".into(),
                file: CHECKOUT_SPEC.into(),
                status: PredictionStatus::Ok,
                reason: String::new(),
            },
        ],
        model: "gpt-4o".into(),
        temperature: 0.2,
        analysis_started_at: Utc
            .with_ymd_and_hms(2026, 1, 5, 10, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
        llm_duration_ms: 1830,
    }
}

pub const SAMPLE_MARKDOWN: &str = "\
## ❌ Likely to break
- pays with card (cypress/e2e/checkout.cy.ts) — data-testid pay-btn was renamed

## ⚠️ At risk
- logs in — link text changed

## ✅ Safe
- applies coupon (cypress/e2e/checkout.cy.ts)
";
