//! Domain models for scopes, unit line sets, and cross-file context.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Category of a named region or resolved name reported by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Param,
    Statement,
    Instance,
    Property,
    /// Any category the oracle reports that has no resolution rule.
    Other(String),
}

impl ScopeKind {
    pub fn as_str(&self) -> &str {
        match self {
            ScopeKind::Module => "module",
            ScopeKind::Class => "class",
            ScopeKind::Function => "function",
            ScopeKind::Param => "param",
            ScopeKind::Statement => "statement",
            ScopeKind::Instance => "instance",
            ScopeKind::Property => "property",
            ScopeKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    /// Build a span, swapping the bounds when given in reverse.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn overlaps(&self, other: &LineSpan) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn lines(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

/// Opaque identifier assigned by the oracle that produced a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub usize);

/// Read-only reference to a scope or resolved name inside one file snapshot.
///
/// Parent and member navigation goes through the oracle that issued the handle, so a handle
/// never outlives the snapshot it was produced for in any meaningful way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeHandle {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    /// `None` when the oracle could not locate the definition.
    pub span: Option<LineSpan>,
    pub file: PathBuf,
    /// Dotted module name of the owning file (`pkg.sub.mod`).
    pub module: String,
}

impl ScopeHandle {
    pub fn is_module(&self) -> bool {
        self.kind == ScopeKind::Module
    }

    /// First dotted component of the owning module, used to decide project membership.
    pub fn package_root(&self) -> &str {
        self.module.split('.').next().unwrap_or_default()
    }

    pub fn describe(&self) -> String {
        format!("{} {} in {}", self.kind, self.name, self.file.display())
    }
}

/// Deduplicated changed line numbers of one file version.
pub type ChangedLines = BTreeSet<usize>;

/// Monotonically growing set of lines that make up an extracted unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitLines {
    lines: BTreeSet<usize>,
}

impl UnitLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, line: usize) -> bool {
        self.lines.contains(&line)
    }

    pub fn insert(&mut self, line: usize) {
        self.lines.insert(line);
    }

    pub fn insert_span(&mut self, span: LineSpan) {
        self.lines.extend(span.lines());
    }

    pub fn extend(&mut self, lines: impl IntoIterator<Item = usize>) {
        self.lines.extend(lines);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines.iter().copied()
    }

    pub fn as_set(&self) -> &BTreeSet<usize> {
        &self.lines
    }

    pub fn into_set(self) -> BTreeSet<usize> {
        self.lines
    }
}

impl FromIterator<usize> for UnitLines {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

impl Extend<usize> for UnitLines {
    fn extend<T: IntoIterator<Item = usize>>(&mut self, iter: T) {
        self.lines.extend(iter);
    }
}

/// Lines of referenced definitions living in other files of the same project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextMap {
    files: BTreeMap<PathBuf, BTreeSet<usize>>,
}

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, file: &Path, lines: impl IntoIterator<Item = usize>) {
        self.files
            .entry(file.to_path_buf())
            .or_default()
            .extend(lines);
    }

    pub fn get(&self, file: &Path) -> Option<&BTreeSet<usize>> {
        self.files.get(file)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &BTreeSet<usize>)> {
        self.files.iter()
    }
}
