//! Unified diff parsing into per-file removed and added line numbers.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("malformed hunk header on patch line {line}: {header}")]
    MalformedHunk { line: usize, header: String },
}

/// Changed lines of one file in a unified diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchedFile {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    /// Old-side line numbers of removed lines.
    pub removed: BTreeSet<usize>,
    /// New-side line numbers of added lines.
    pub added: BTreeSet<usize>,
}

impl PatchedFile {
    fn has_hunks(&self) -> bool {
        !self.removed.is_empty() || !self.added.is_empty()
    }

    fn is_empty(&self) -> bool {
        self.old_path.is_none() && self.new_path.is_none() && !self.has_hunks()
    }
}

/// Position inside the hunk currently being read.
#[derive(Debug, Default)]
struct Hunk {
    old_line: usize,
    new_line: usize,
    old_left: usize,
    new_left: usize,
}

impl Hunk {
    fn is_open(&self) -> bool {
        self.old_left > 0 || self.new_left > 0
    }
}

/// Parse a unified diff. Patches that carry only hunks yield a single pathless file.
pub fn parse_patch(text: &str) -> Result<Vec<PatchedFile>, PatchError> {
    let mut files = Vec::new();
    let mut current = PatchedFile::default();
    let mut hunk = Hunk::default();

    for (idx, line) in text.lines().enumerate() {
        if hunk.is_open() {
            match line.chars().next() {
                Some('+') => {
                    current.added.insert(hunk.new_line);
                    hunk.new_line += 1;
                    hunk.new_left = hunk.new_left.saturating_sub(1);
                }
                Some('-') => {
                    current.removed.insert(hunk.old_line);
                    hunk.old_line += 1;
                    hunk.old_left = hunk.old_left.saturating_sub(1);
                }
                Some('\\') => {}
                _ => {
                    hunk.old_line += 1;
                    hunk.new_line += 1;
                    hunk.old_left = hunk.old_left.saturating_sub(1);
                    hunk.new_left = hunk.new_left.saturating_sub(1);
                }
            }
            continue;
        }

        if line.starts_with("@@") {
            hunk = parse_hunk_header(line, idx + 1)?;
        } else if line.starts_with("diff --git ") {
            if !current.is_empty() {
                files.push(std::mem::take(&mut current));
            }
        } else if let Some(path) = line.strip_prefix("--- ") {
            if current.has_hunks() {
                files.push(std::mem::take(&mut current));
            }
            current.old_path = header_path(path, "a/");
        } else if let Some(path) = line.strip_prefix("+++ ") {
            current.new_path = header_path(path, "b/");
        }
    }
    if !current.is_empty() {
        files.push(current);
    }
    Ok(files)
}

fn parse_hunk_header(header: &str, line: usize) -> Result<Hunk, PatchError> {
    let malformed = || PatchError::MalformedHunk {
        line,
        header: header.to_string(),
    };
    let caps = HUNK_HEADER.captures(header).ok_or_else(malformed)?;
    let number = |group: usize, default: Option<usize>| -> Result<usize, PatchError> {
        match caps.get(group) {
            Some(value) => value.as_str().parse().map_err(|_| malformed()),
            None => default.ok_or_else(malformed),
        }
    };
    Ok(Hunk {
        old_line: number(1, None)?,
        old_left: number(2, Some(1))?,
        new_line: number(3, None)?,
        new_left: number(4, Some(1))?,
    })
}

fn header_path(raw: &str, prefix: &str) -> Option<String> {
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(prefix).unwrap_or(path).to_string())
}
