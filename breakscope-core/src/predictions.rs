//! Upstream verdict handling: the markdown response parser and spec lookup.
//!
//! Two section styles are recognized:
//!
//! ```text
//! ## ❌ Likely to break            - **Broken:**
//! - pays with card (checkout.cy.ts) — selector renamed      - pays with card: selector renamed
//! ```
//!
//! Each line goes through one transition in fixed precedence: heading, then
//! legacy bold label, then entry bullet. Bullets outside a recognized section
//! are ignored.

use tracing::warn;

use crate::types::{PredictionStatus, SpecChunk, UpstreamPrediction};

/// Parser state: which verdict section the current line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Broken,
    Risk,
    Ok,
}

impl Section {
    fn status(self) -> Option<PredictionStatus> {
        match self {
            Self::None => None,
            Self::Broken => Some(PredictionStatus::Broken),
            Self::Risk => Some(PredictionStatus::Risk),
            Self::Ok => Some(PredictionStatus::Ok),
        }
    }
}

/// Map free heading/label text to a section. `None` if nothing matches.
fn classify(label: &str) -> Option<Section> {
    let lower = label.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has = |w: &str| words.contains(&w);
    let phrase = |p: &str| lower.contains(p);

    if has("ok")
        || has("safe")
        || has("pass")
        || has("passing")
        || has("unaffected")
        || phrase("not affected")
        || phrase("no impact")
        || phrase("no risk")
    {
        return Some(Section::Ok);
    }
    if has("risk") || has("risky") || has("flaky") || ((has("may") || has("might")) && has("break"))
    {
        return Some(Section::Risk);
    }
    if ["broken", "break", "breaks", "breaking", "fail", "fails", "failing", "failure"]
        .iter()
        .any(|w| has(w))
    {
        return Some(Section::Broken);
    }

    // Emoji-only headings
    if label.contains('✅') {
        Some(Section::Ok)
    } else if label.contains('⚠') {
        Some(Section::Risk)
    } else if label.contains('❌') {
        Some(Section::Broken)
    } else {
        None
    }
}

fn strip_bullet(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = trimmed.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim());
        }
    }
    None
}

/// `**Label:** rest` or `**Label**: rest`, returning `(label, rest)`.
fn legacy_label(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix("**")?;
    let end = inner.find("**")?;
    let (label, rest) = (&inner[..end], &inner[end + 2..]);
    if let Some(label) = label.trim().strip_suffix(':') {
        return Some((label, rest.trim()));
    }
    let rest = rest.trim_start().strip_prefix(':')?;
    Some((label.trim(), rest.trim()))
}

fn clean_name(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '*' | '`' | '"' | '\'' | '_'))
        .trim()
        .to_string()
}

/// Split an entry into `(test, file, reason)`.
fn parse_entry(text: &str) -> (String, String, String) {
    let (head, reason) = [" — ", " – ", " - ", ": "]
        .iter()
        .find_map(|sep| text.split_once(sep))
        .map_or((text, ""), |(h, r)| (h, r.trim()));

    let head = head.trim();
    if let (Some(open), true) = (head.rfind('('), head.ends_with(')')) {
        let file = &head[open + 1..head.len() - 1];
        if file.contains('.') || file.contains('/') {
            return (
                clean_name(&head[..open]),
                clean_name(file),
                reason.to_string(),
            );
        }
    }
    (clean_name(head), String::new(), reason.to_string())
}

/// Parse the upstream markdown response into ordered verdicts.
///
/// Entries without a test name are skipped with a warning.
pub fn parse_markdown(markdown: &str) -> Vec<UpstreamPrediction> {
    let mut section = Section::None;
    let mut verdicts = Vec::new();

    for (lineno, line) in markdown.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('#') {
            section = classify(trimmed.trim_start_matches('#')).unwrap_or(Section::None);
            continue;
        }

        let body = strip_bullet(line).unwrap_or(trimmed);
        if let Some((label, rest)) = legacy_label(body) {
            if let Some(next) = classify(label) {
                section = next;
                if rest.is_empty() {
                    continue;
                }
                push_entry(&mut verdicts, section, rest, lineno);
                continue;
            }
        }

        if let Some(entry) = strip_bullet(line) {
            push_entry(&mut verdicts, section, entry, lineno);
        }
    }
    verdicts
}

fn push_entry(
    verdicts: &mut Vec<UpstreamPrediction>,
    section: Section,
    entry: &str,
    lineno: usize,
) {
    let Some(status) = section.status() else {
        return;
    };
    let (test, file, reason) = parse_entry(entry);
    if test.is_empty() {
        warn!(line = lineno + 1, status = %status, "Skipping verdict entry without a test name");
        return;
    }
    verdicts.push(UpstreamPrediction {
        test,
        file,
        status,
        reason,
    });
}

/// The spec chunk a verdict refers to: exact test name, then
/// case-insensitive name, both restricted to the verdict's file when it names
/// one. Verdicts without a file may also match a spec whose filename appears
/// in the test text.
pub fn best_matching_spec<'a>(
    verdict: &UpstreamPrediction,
    specs: &'a [SpecChunk],
) -> Option<&'a SpecChunk> {
    let test = verdict.test.trim();
    let candidates = || {
        specs
            .iter()
            .filter(|s| verdict.file.is_empty() || s.filename == verdict.file)
    };

    candidates()
        .find(|s| s.test_name == test)
        .or_else(|| candidates().find(|s| s.test_name.trim().eq_ignore_ascii_case(test)))
        .or_else(|| {
            if !verdict.file.is_empty() {
                return None;
            }
            specs.iter().find(|s| {
                let stem = s.filename.rsplit('/').next().unwrap_or(&s.filename);
                !stem.is_empty() && test.contains(stem)
            })
        })
}

/// The verdict's own file when supplied, else the best matching spec's.
pub fn resolve_file(verdict: &UpstreamPrediction, specs: &[SpecChunk]) -> String {
    if !verdict.file.is_empty() {
        return verdict.file.clone();
    }
    best_matching_spec(verdict, specs)
        .map(|s| s.filename.clone())
        .unwrap_or_default()
}
