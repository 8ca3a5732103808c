//! Removal of assistant-speak filler

use regex::Regex;
use std::sync::LazyLock;

use super::re;

/// Acknowledgement openers at the start of a line, possibly chained
static OPENERS: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?im)^(?:(?:certainly|absolutely|of course|sure|great question|good question|excellent question|that's a great question|what a great question|i'd be happy to help(?: with that)?|i would be happy to help(?: with that)?|happy to help)[!.,:]?[ \t]+)+")
});

static FILLER: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // AI self-reference
        r"(?i)\bas an ai(?: language model| assistant)?,?[ \t]*",
        r"(?i)\bas a large language model,?[ \t]*",
        // Hedging
        r"(?i)\bit(?:'s| is) (?:important|worth) (?:to note|noting) that[ \t]*",
        r"(?i)\bit should be noted that[ \t]*",
        r"(?i)\bplease note that[ \t]*",
        // Closing boilerplate
        r"(?i)\bi hope (?:this|that) helps[!.]?[ \t]*",
        r"(?i)\blet me know if (?:you have|there are) (?:any )?(?:other |further |more )?questions[!.]?[ \t]*",
        r"(?i)\blet me know if you (?:need|want|would like)[^.!?\n]*[.!?]?[ \t]*",
        r"(?i)\bfeel free to (?:ask|reach out)[^.!?\n]*[.!?]?[ \t]*",
        r"(?i)\bhappy to help further[!.]?[ \t]*",
    ]
    .iter()
    .map(|pattern| re(pattern))
    .collect()
});

/// Runs of spaces after visible text (leading indentation is left alone)
static DOUBLE_SPACES: LazyLock<Regex> = LazyLock::new(|| re(r"(\S) {2,}"));

/// Removing filler can expose an opener at a line start, so passes repeat
/// until nothing changes
const MAX_PASSES: usize = 4;

/// Strip filler phrases. Double spaces are collapsed only when something
/// was removed, so already-clean text passes through untouched.
pub fn humanize(text: &str) -> String {
    let mut stripped = text.to_string();
    for _ in 0..MAX_PASSES {
        let next = strip_once(&stripped);
        if next == stripped {
            break;
        }
        stripped = next;
    }

    if stripped == text {
        return stripped;
    }
    DOUBLE_SPACES.replace_all(&stripped, "$1 ").into_owned()
}

fn strip_once(text: &str) -> String {
    let stripped = OPENERS.replace_all(text, "").into_owned();
    FILLER
        .iter()
        .fold(stripped, |acc, pattern| pattern.replace_all(&acc, "").into_owned())
}
