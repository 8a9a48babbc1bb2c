//! Line-level access to source files at their current on-disk state.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::errors::ResolveError;

const DECORATOR_MARKER: char = '@';

/// Read exactly the requested 1-based lines of `path`, in ascending order.
///
/// Line numbers past the end of the file are omitted. Line terminators are stripped.
pub fn read_lines(path: &Path, line_numbers: &BTreeSet<usize>) -> Result<Vec<String>, ResolveError> {
    let source = SourceFile::load(path)?;
    Ok(source.select(line_numbers))
}

/// Net bracket nesting of one line, ignoring quoted text and comments.
fn bracket_delta(text: &str) -> isize {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '#') => break,
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn indent_width(text: &str) -> usize {
    text.len() - text.trim_start().len()
}

/// Join selected lines into unit text.
pub fn render(lines: &[String]) -> String {
    lines.join("\n")
}

/// Snapshot of one file split into lines.
#[derive(Debug, Clone)]
pub struct SourceFile {
    path: PathBuf,
    lines: Vec<String>,
}

impl SourceFile {
    pub fn load(path: &Path) -> Result<Self, ResolveError> {
        let bytes = fs::read(path).map_err(|source| ResolveError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        if matches!(text, Cow::Owned(_)) {
            tracing::debug!(path = %path.display(), "decoded file with replacement characters");
        }
        Ok(Self::from_text(path, &text))
    }

    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_owned).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Raw text of a 1-based line.
    pub fn text(&self, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map(String::as_str)
    }

    pub fn is_decorator(&self, line: usize) -> bool {
        self.text(line)
            .is_some_and(|text| text.trim_start().starts_with(DECORATOR_MARKER))
    }

    pub fn is_blank(&self, line: usize) -> bool {
        self.text(line).is_some_and(|text| text.trim().is_empty())
    }

    /// Move `start` up over the decorators directly above it. A decorator whose bracketed
    /// arguments run over several lines is taken whole.
    pub fn decorated_start(&self, start: usize) -> usize {
        let indent = self.text(start).map(indent_width).unwrap_or_default();
        let mut current = start;
        let mut above = start;
        while above > 1 {
            above -= 1;
            let Some(text) = self.text(above) else {
                break;
            };
            let trimmed = text.trim_start();
            if trimmed.starts_with(DECORATOR_MARKER) {
                if !self.decorator_closes_before(above, current) {
                    break;
                }
                current = above;
                continue;
            }
            let continuation = !trimmed.is_empty()
                && (indent_width(text) > indent || trimmed.starts_with([')', ']', '}']));
            if !continuation {
                break;
            }
        }
        current
    }

    /// Whether the decorator on line `from` stays bracketed until it closes on line `to - 1`.
    fn decorator_closes_before(&self, from: usize, to: usize) -> bool {
        let mut depth = 0;
        for line in from..to {
            depth += bracket_delta(self.text(line).unwrap_or_default());
            if line + 1 < to && depth <= 0 {
                return false;
            }
        }
        depth == 0
    }

    pub fn select(&self, line_numbers: &BTreeSet<usize>) -> Vec<String> {
        line_numbers
            .iter()
            .filter_map(|line| self.text(*line).map(str::to_owned))
            .collect()
    }
}

/// Per-job cache so each file is read once per checked-out snapshot.
#[derive(Debug, Default)]
pub struct SourceCache {
    files: HashMap<PathBuf, Arc<SourceFile>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &Path) -> Result<Arc<SourceFile>, ResolveError> {
        if let Some(source) = self.files.get(path) {
            return Ok(Arc::clone(source));
        }
        let source = Arc::new(SourceFile::load(path)?);
        self.files.insert(path.to_path_buf(), Arc::clone(&source));
        Ok(source)
    }

    /// Register an already loaded file, e.g. one built from in-memory text.
    pub fn insert(&mut self, source: SourceFile) -> Arc<SourceFile> {
        let source = Arc::new(source);
        self.files
            .insert(source.path().to_path_buf(), Arc::clone(&source));
        source
    }
}
