//! Comment stripping for rendered unit text.

use once_cell::sync::Lazy;
use regex::Regex;

static COMMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*#.*(?:\n|$)").expect("comment line regex"));
static BLANK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("blank run regex"));

/// Remove `#` comments and collapse runs of empty lines.
///
/// Trailing comments are cut only when the `#` sits outside a string literal on its line.
pub fn strip_comments(text: &str) -> String {
    let without_lines = COMMENT_LINE.replace_all(text, "");
    let trimmed: Vec<&str> = without_lines.lines().map(cut_trailing_comment).collect();
    let joined = trimmed.join("\n");
    BLANK_RUN
        .replace_all(&joined, "\n")
        .trim_matches('\n')
        .to_string()
}

fn cut_trailing_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some(_), '\\') => escaped = true,
            (Some(open), c) if c == open => quote = None,
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') => return line[..idx].trim_end(),
            _ => {}
        }
    }
    line
}
