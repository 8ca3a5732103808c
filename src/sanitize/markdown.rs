//! Markdown stripping for plain-text display

use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::re;

/// Reasoning blocks emitted by reasoning models (DeepSeek R1 and friends)
static REASONING_TAGS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    ["think", "thinking", "reasoning", "reflection"]
        .iter()
        .map(|tag| re(&format!(r"(?is)<{tag}>.*?</{tag}>")))
        .collect()
});

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)```.*?```"));
static FENCE_OPENER: LazyLock<Regex> = LazyLock::new(|| re(r"^```\w*\n"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"`([^`]+)`"));
static HEADER: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^#{1,6}[ \t]+(.+)$"));
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| re(r"\*\*([^*]+)\*\*"));
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| re(r"__([^_]+)__"));
static HORIZONTAL_RULE: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^[-*_]{3,}[ \t]*$"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^[ \t]*[*+][ \t]+"));
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| re(r"\*([^*\n]+)\*"));
static ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| re(r"_([^_\n]+)_"));
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| re(r"~~([^~]+)~~"));
static IMAGE: LazyLock<Regex> = LazyLock::new(|| re(r"!\[([^\]]*)\]\([^)]+\)"));
static LINK: LazyLock<Regex> = LazyLock::new(|| re(r"\[([^\]]+)\]\([^)]+\)"));
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^>[ \t]*"));
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| re(r"<[^>]+>"));
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| re(r"\n{3,}"));

/// Strip markdown formatting, keeping the readable text
pub fn strip_markdown(text: &str) -> String {
    let mut result = strip_reasoning(text);

    result = CODE_FENCE
        .replace_all(&result, |caps: &Captures| unwrap_fence(&caps[0]))
        .into_owned();
    result = INLINE_CODE.replace_all(&result, "$1").into_owned();
    result = HEADER.replace_all(&result, "$1").into_owned();
    result = BOLD_STARS.replace_all(&result, "$1").into_owned();
    result = BOLD_UNDERSCORES.replace_all(&result, "$1").into_owned();

    // Rules and bullets go before italics so a leading `*` is not read as emphasis
    result = HORIZONTAL_RULE.replace_all(&result, "").into_owned();
    result = BULLET.replace_all(&result, "- ").into_owned();
    result = replace_emphasis(&ITALIC_STAR, &result, |c| c != '*');
    result = replace_emphasis(&ITALIC_UNDERSCORE, &result, |c| c != '_' && !c.is_alphanumeric());

    result = STRIKETHROUGH.replace_all(&result, "$1").into_owned();
    result = IMAGE.replace_all(&result, "$1").into_owned();
    result = LINK.replace_all(&result, "$1").into_owned();
    result = BLOCKQUOTE.replace_all(&result, "").into_owned();
    result = HTML_TAG.replace_all(&result, "").into_owned();
    result = EXCESS_NEWLINES.replace_all(&result, "\n\n").into_owned();

    result.trim().to_string()
}

/// Remove reasoning blocks together with their contents
pub fn strip_reasoning(text: &str) -> String {
    REASONING_TAGS
        .iter()
        .fold(text.to_string(), |acc, tag| tag.replace_all(&acc, "").into_owned())
}

/// Keep the body of a fenced block, dropping the fence lines
fn unwrap_fence(block: &str) -> String {
    let lines: Vec<&str> = block.split('\n').collect();
    if lines.len() > 2 {
        lines[1..lines.len() - 1].join("\n")
    } else {
        FENCE_OPENER.replace_all(block, "").replace("```", "")
    }
}

/// Unwrap single-delimiter emphasis when the characters around the match
/// satisfy `boundary_ok` (a missing neighbour always does)
fn replace_emphasis(pattern: &Regex, text: &str, boundary_ok: impl Fn(char) -> bool) -> String {
    pattern
        .replace_all(text, |caps: &Captures| {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            let before = text[..whole.start].chars().next_back();
            let after = text[whole.end..].chars().next();
            if before.map_or(true, &boundary_ok) && after.map_or(true, &boundary_ok) {
                caps[1].to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}
