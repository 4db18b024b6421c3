//! Content-addressable identifiers.
//!
//! Every deduplicable entity hashes a canonical, type-prefixed serialization
//! of its defining content. The digest is SHA-256 truncated to 160 bits and
//! rendered as 40 lowercase hex characters, so the same content re-derives
//! the same graph ID on every run and any byte of difference yields a new one.
//!
//! Event entities (analysis runs, predictions) are not content: they get a
//! fresh random ID from [`event_id`].

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::types::{ChangedCodeChunk, SelectorChange, SpecChunk};

/// Digest width in bytes (160 bits).
const ID_BYTES: usize = 20;

fn digest_hex(canonical: &str) -> String {
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(ID_BYTES * 2);
    for byte in &digest[..ID_BYTES] {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

pub fn organization_id(name: &str) -> String {
    digest_hex(&format!("org:{name}"))
}

/// `repo_full_name` is `<org>/<repo>`.
pub fn repository_id(repo_full_name: &str) -> String {
    digest_hex(&format!("repo:{repo_full_name}"))
}

pub fn pull_request_id(repository_id: &str, number: i64) -> String {
    digest_hex(&format!("pr:{repository_id}:{number}"))
}

pub fn changed_chunk_id(chunk: &ChangedCodeChunk) -> String {
    digest_hex(&format!("ast:{}:{}", chunk.filename, chunk.raw_diff))
}

pub fn spec_chunk_id(chunk: &SpecChunk) -> String {
    digest_hex(&format!("spec:{}", chunk.body))
}

pub fn selector_change_id(change: &SelectorChange) -> String {
    digest_hex(&format!(
        "jsx:{}:{}:{}:{}",
        change.element,
        change.attribute,
        change.added.as_deref().unwrap_or_default(),
        change.removed.as_deref().unwrap_or_default(),
    ))
}

/// Random identifier for an event that must never be deduplicated.
pub fn event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkMetadata;

    fn chunk(filename: &str, diff: &str) -> ChangedCodeChunk {
        ChangedCodeChunk {
            filename: filename.into(),
            raw_diff: diff.into(),
            metadata: ChunkMetadata::default(),
            summary: String::new(),
        }
    }

    #[test]
    fn ids_are_40_lowercase_hex_chars() {
        let id = organization_id("acme");
        assert_eq!(id.len(), 40);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn one_character_of_diff_changes_the_id() {
        let a = changed_chunk_id(&chunk("Checkout.tsx", "+<button data-testid=\"pay\">"));
        let b = changed_chunk_id(&chunk("Checkout.tsx", "+<button data-testid=\"pax\">"));
        assert_ne!(a, b);
    }

    #[test]
    fn unrelated_metadata_does_not_affect_chunk_id() {
        let plain = chunk("a.tsx", "+x");
        let mut annotated = plain.clone();
        annotated.summary = "adds x".into();
        annotated.metadata.components.push("A".into());
        assert_eq!(changed_chunk_id(&plain), changed_chunk_id(&annotated));
    }

    #[test]
    fn spec_identity_is_the_body_only() {
        let a = SpecChunk {
            test_name: "pays".into(),
            filename: "checkout.spec.ts".into(),
            body: "cy.get('[data-testid=pay]').click()".into(),
        };
        let mut renamed = a.clone();
        renamed.test_name = "pays with card".into();
        renamed.filename = "moved.spec.ts".into();
        assert_eq!(spec_chunk_id(&a), spec_chunk_id(&renamed));
    }

    #[test]
    fn entity_prefixes_separate_namespaces() {
        assert_ne!(organization_id("acme"), repository_id("acme"));
    }

    #[test]
    fn selector_change_treats_missing_side_as_empty() {
        let change = SelectorChange {
            element: "button".into(),
            attribute: "data-testid".into(),
            added: Some("pay".into()),
            removed: None,
        };
        assert_eq!(
            selector_change_id(&change),
            digest_hex("jsx:button:data-testid:pay:")
        );
    }

    #[test]
    fn pr_id_depends_on_repository_and_number() {
        let repo = repository_id("acme/shop");
        assert_eq!(pull_request_id(&repo, 7), pull_request_id(&repo, 7));
        assert_ne!(pull_request_id(&repo, 7), pull_request_id(&repo, 8));
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(event_id(), event_id());
    }
}
