// Markdown cleanup for plain terminal output


use fancy_regex::Regex;
use std::sync::LazyLock;

/// Applied in order; emphasis markers go first so list bullets written with `*` vanish with them
static CLEANUP_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"\*\*|\*|__|_").expect("valid regex"), ""),
        (Regex::new(r"(?s)```.*?```").expect("valid regex"), ""),
        (Regex::new(r"`[^`]*`").expect("valid regex"), ""),
        (Regex::new(r"(?m)^#+\s+").expect("valid regex"), ""),
        (Regex::new(r"(?m)^[*-]\s+").expect("valid regex"), ""),
        (Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"), "$1"),
        (Regex::new(r"\s+").expect("valid regex"), " "),
    ]
});

/// Strip markdown formatting and collapse whitespace to single spaces
#[inline]
pub fn clean_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    CLEANUP_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, (regex, replacement)| {
            regex.replace_all(&acc, *replacement).into_owned()
        })
        .trim()
        .to_string()
}
