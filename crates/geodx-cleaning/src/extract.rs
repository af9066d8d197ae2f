//! Step 1: text extraction.
//!
//! Strips markup, unescapes entities, collapses whitespace, and enforces
//! length bounds. Never errors — an empty input produces a warning, not a
//! failure, so the rest of the pipeline can still stamp the record.

use std::sync::LazyLock;

use regex::Regex;

pub(crate) const MAX_LEN: usize = 20_000;
pub(crate) const MIN_LEN: usize = 10;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex is valid"));

pub(crate) struct ExtractOutcome {
    pub text: String,
    pub original_len: usize,
    pub truncated: bool,
    pub warnings: Vec<String>,
}

/// Normalize one raw response body.
pub(crate) fn extract_text(raw: &str) -> ExtractOutcome {
    let mut warnings = Vec::new();
    let original_len = raw.chars().count();

    if raw.trim().is_empty() {
        warnings.push("response content is empty".to_owned());
        return ExtractOutcome {
            text: String::new(),
            original_len,
            truncated: false,
            warnings,
        };
    }

    let without_tags = TAG_RE.replace_all(raw, " ");
    let unescaped = unescape_entities(&without_tags);
    let mut text = unescaped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let mut truncated = false;
    if text.chars().count() > MAX_LEN {
        text = text.chars().take(MAX_LEN).collect();
        truncated = true;
        warnings.push(format!("response truncated to {MAX_LEN} characters"));
    }

    if text.chars().count() < MIN_LEN {
        warnings.push(format!(
            "response is shorter than {MIN_LEN} characters after cleaning"
        ));
    }

    ExtractOutcome {
        text,
        original_len,
        truncated,
        warnings,
    }
}

/// Unescape the common named entities plus `&#39;`.
fn unescape_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}
