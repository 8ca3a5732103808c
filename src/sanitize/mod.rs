//! Response sanitization
//!
//! Every model output passes through [`sanitize`] before it is shown:
//! guardrail redaction, markdown stripping, filler removal and whitespace
//! normalization, in that order. Redaction is repeated after markdown and
//! filler removal. The pipeline is idempotent.

mod guardrails;
mod humanize;
mod markdown;
mod pii;

pub use guardrails::{apply_guardrails, is_flagged, REDACTION_MARKER};
pub use humanize::humanize;
pub use markdown::{strip_markdown, strip_reasoning};
pub use pii::{restore_pii, sanitize_pii, PiiMapping, PiiSubjects, SanitizedText, StartupProfile};

use regex::Regex;
use std::sync::LazyLock;

static WIDE_SPACES: LazyLock<Regex> = LazyLock::new(|| re(r" {3,}"));
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| re(r"\n{3,}"));

/// Compile a built-in pattern. These are literals checked by the test
/// suite, so failure here is a programming error.
pub(crate) fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern:?}: {e}"))
}

/// Run the full sanitization pipeline on a raw model output
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = apply_guardrails(raw);
    // Markup and filler can split a phrase the raw pass would have caught
    let text = apply_guardrails(&strip_markdown(&text));
    let text = apply_guardrails(&humanize(&text));
    normalize_whitespace(&text)
}

pub fn sanitize_all<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter().map(|r| sanitize(r.as_ref())).collect()
}

fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\t', "  ");
    let text = WIDE_SPACES.replace_all(&text, "  ");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}
