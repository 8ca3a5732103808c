//! Redaction of injection, disclosure, harmful and off-topic phrasing

use regex::Regex;
use std::sync::LazyLock;

use super::re;

/// Replaces every guardrail match
pub const REDACTION_MARKER: &str = "[FILTERED]";

static GUARDRAIL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Prompt injection
        r"(?i)\bignore (?:all )?(?:previous|all|above|prior) instructions?\b",
        r"(?i)\bdisregard (?:all )?(?:previous|all|above|prior)(?: instructions?)?\b",
        r"(?i)\bforget (?:everything|all|your) (?:you|instructions)\b",
        r"(?i)\byou are now\b",
        r"(?i)\bact as(?: if)?\b",
        r"(?i)\bpretend (?:to be|you are)\b",
        r"(?i)\bnew instructions:",
        r"(?i)\b(?:override|bypass) (?:your |the |all |any )?(?:rules|instructions|restrictions|guidelines|guardrails|safety|filters?)\b",
        // System prompt disclosure
        r"(?i)\bsystem prompt\b",
        r"(?i)\breveal your (?:instructions|prompt)\b",
        r"(?i)\b(?:show|tell|print|repeat) (?:me )?your (?:initial |hidden )?(?:instructions|prompt)\b",
        // Harmful requests
        r"(?i)\b(?:how (?:to|do i|can i)|help me|teach me(?: how)?(?: to)?|steps to)\s+(?:hack(?: into)?|break into|(?:write|create|build|deploy) (?:a |some )?(?:malware|virus|ransomware|keylogger)|commit (?:fraud|tax evasion)|launder money|evade (?:taxes|tax))\b",
        r"(?i)\b(?:money laundering|tax evasion|fraud) (?:scheme|schemes|strategy|strategies|tips|techniques|methods)\b",
        // Off-topic creative writing
        r"(?i)\b(?:write|compose|tell) (?:me )?(?:a |an )?(?:poem|song|lyrics|short story|fairy tale|joke|rap|haiku|limerick)\b",
    ]
    .iter()
    .map(|pattern| re(pattern))
    .collect()
});

/// Replace guardrail matches with [`REDACTION_MARKER`]
pub fn apply_guardrails(text: &str) -> String {
    GUARDRAIL_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, pattern| {
            pattern.replace_all(&acc, REDACTION_MARKER).into_owned()
        })
}

/// True when any guardrail would fire
pub fn is_flagged(text: &str) -> bool {
    GUARDRAIL_PATTERNS.iter().any(|pattern| pattern.is_match(text))
}
