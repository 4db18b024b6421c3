// Natural-language renderings used as retrieval queries and embedding input.

use std::fmt::Write as _;

use crate::types::{ChangedCodeChunk, SpecChunk};

/// Render a changed chunk as the query both rankers see.
pub fn render_query(chunk: &ChangedCodeChunk) -> String {
    let mut out = format!("File: {}", chunk.filename);
    if !chunk.summary.trim().is_empty() {
        let _ = write!(out, "\nSummary: {}", chunk.summary.trim());
    }

    let meta = &chunk.metadata;
    if !meta.components.is_empty() {
        let _ = write!(out, "\nComponents: {}", meta.components.join(", "));
    }
    if !meta.functions.is_empty() {
        let _ = write!(out, "\nFunctions: {}", meta.functions.join(", "));
    }
    for change in &meta.selector_changes {
        let removed = change.removed.as_deref().unwrap_or("(none)");
        let added = change.added.as_deref().unwrap_or("(none)");
        let _ = write!(
            out,
            "\nSelector change on {} {}: {removed} -> {added}",
            change.element, change.attribute
        );
    }
    if !meta.test_selectors.is_empty() {
        let _ = write!(out, "\nTest selectors: {}", meta.test_selectors.join(", "));
    }
    out
}

/// Render a spec chunk for embedding.
pub fn render_spec_text(spec: &SpecChunk) -> String {
    format!("Test: {}\n{}", spec.test_name, spec.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, SelectorChange};

    #[test]
    fn query_mentions_every_structural_signal() {
        let chunk = ChangedCodeChunk {
            filename: "src/Checkout.tsx".into(),
            raw_diff: "-a\n+b".into(),
            metadata: ChunkMetadata {
                components: vec!["CheckoutForm".into()],
                functions: vec!["submitOrder".into()],
                selector_changes: vec![SelectorChange {
                    element: "button".into(),
                    attribute: "data-testid".into(),
                    added: Some("checkout-btn".into()),
                    removed: Some("pay-btn".into()),
                }],
                test_selectors: vec!["checkout-btn".into()],
            },
            summary: "Renames the pay button".into(),
        };
        let query = render_query(&chunk);
        assert!(query.starts_with("File: src/Checkout.tsx"));
        assert!(query.contains("Summary: Renames the pay button"));
        assert!(query.contains("Components: CheckoutForm"));
        assert!(query.contains("Functions: submitOrder"));
        assert!(query.contains("button data-testid: pay-btn -> checkout-btn"));
        assert!(query.contains("Test selectors: checkout-btn"));
    }

    #[test]
    fn bare_chunk_renders_filename_only() {
        let chunk = ChangedCodeChunk {
            filename: "a.ts".into(),
            raw_diff: "+1".into(),
            metadata: ChunkMetadata::default(),
            summary: "  ".into(),
        };
        assert_eq!(render_query(&chunk), "File: a.ts");
    }
}
