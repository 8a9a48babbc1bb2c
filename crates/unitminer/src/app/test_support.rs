//! Oracles and fixtures shared by the resolver tests.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::app::lines::{SourceCache, SourceFile};
use crate::domain::errors::OracleError;
use crate::domain::model::{LineSpan, ScopeHandle, ScopeId, ScopeKind};
use crate::domain::oracle::SymbolOracle;
use crate::infra::outline::OutlineOracle;

pub(crate) const FIXTURE_PATH: &str = "pkg/mod.py";

/// Outline oracle and source cache over a single in-memory module at [`FIXTURE_PATH`].
pub(crate) fn python_fixture(text: &str) -> (OutlineOracle, SourceCache) {
    let oracle = OutlineOracle::new("");
    oracle.insert_source(FIXTURE_PATH, text);
    let mut sources = SourceCache::new();
    sources.insert(SourceFile::from_text(FIXTURE_PATH, text));
    (oracle, sources)
}

/// Handle lookups by name for fixture modules.
pub(crate) trait FixtureLookup {
    fn module(&self) -> ScopeHandle;
    fn named(&self, name: &str) -> ScopeHandle;
}

impl FixtureLookup for OutlineOracle {
    fn module(&self) -> ScopeHandle {
        let mut scope = self
            .scope_at(Path::new(FIXTURE_PATH), 1)
            .expect("fixture has a first line");
        while let Some(parent) = self.parent_of(&scope).expect("parent lookup") {
            scope = parent;
        }
        scope
    }

    fn named(&self, name: &str) -> ScopeHandle {
        let mut pending = vec![self.module()];
        while let Some(scope) = pending.pop() {
            for member in self.members_of(&scope).expect("members lookup") {
                if member.name == name {
                    return member;
                }
                pending.push(member);
            }
        }
        panic!("no definition named {name} in fixture");
    }
}

struct Entry {
    handle: ScopeHandle,
    parent: Option<ScopeId>,
}

/// Oracle answering from an explicit table, for shapes a real outline never produces.
pub(crate) struct TableOracle {
    path: PathBuf,
    module: String,
    line_count: usize,
    entries: Vec<Entry>,
    hidden_members: HashSet<ScopeId>,
    member_overrides: HashMap<ScopeId, Vec<ScopeHandle>>,
    references: HashMap<(usize, usize), Vec<ScopeHandle>>,
}

impl TableOracle {
    pub(crate) fn new(path: &str, line_count: usize) -> Self {
        Self {
            path: PathBuf::from(path),
            module: path.trim_end_matches(".py").replace('/', "."),
            line_count,
            entries: Vec::new(),
            hidden_members: HashSet::new(),
            member_overrides: HashMap::new(),
            references: HashMap::new(),
        }
    }

    pub(crate) fn module(&self) -> ScopeHandle {
        ScopeHandle {
            id: ScopeId(0),
            kind: ScopeKind::Module,
            name: self.module.clone(),
            span: None,
            file: self.path.clone(),
            module: self.module.clone(),
        }
    }

    pub(crate) fn add_scope(
        &mut self,
        kind: ScopeKind,
        name: &str,
        span: Option<LineSpan>,
        parent: Option<&ScopeHandle>,
    ) -> ScopeHandle {
        let handle = ScopeHandle {
            id: ScopeId(self.entries.len() + 1),
            kind,
            name: name.to_string(),
            span,
            file: self.path.clone(),
            module: self.module.clone(),
        };
        self.entries.push(Entry {
            handle: handle.clone(),
            parent: parent.map(|parent| parent.id),
        });
        handle
    }

    pub(crate) fn add_function(
        &mut self,
        name: &str,
        span: Option<LineSpan>,
        parent: Option<&ScopeHandle>,
    ) -> ScopeHandle {
        self.add_scope(ScopeKind::Function, name, span, parent)
    }

    pub(crate) fn hide_members(&mut self, scope: &ScopeHandle) {
        self.hidden_members.insert(scope.id);
    }

    pub(crate) fn set_members(&mut self, scope: &ScopeHandle, members: Vec<ScopeHandle>) {
        self.member_overrides.insert(scope.id, members);
    }

    pub(crate) fn add_reference(&mut self, line: usize, column: usize, target: ScopeHandle) {
        self.references
            .entry((line, column))
            .or_default()
            .push(target);
    }

    fn entry(&self, id: ScopeId) -> Option<&Entry> {
        id.0.checked_sub(1).and_then(|index| self.entries.get(index))
    }
}

impl SymbolOracle for TableOracle {
    fn scope_at(&self, file: &Path, line: usize) -> Result<ScopeHandle, OracleError> {
        if file != self.path {
            return Err(OracleError::ForeignFile {
                path: file.to_path_buf(),
            });
        }
        if line == 0 || line > self.line_count {
            return Err(OracleError::LineOutOfRange {
                path: file.to_path_buf(),
                line,
            });
        }
        Ok(self
            .entries
            .iter()
            .filter(|entry| {
                matches!(entry.handle.kind, ScopeKind::Class | ScopeKind::Function)
                    && entry.handle.span.is_some_and(|span| span.contains(line))
            })
            .max_by_key(|entry| entry.handle.span.map(|span| span.start))
            .map(|entry| entry.handle.clone())
            .unwrap_or_else(|| self.module()))
    }

    fn members_of(&self, scope: &ScopeHandle) -> Result<Vec<ScopeHandle>, OracleError> {
        if self.hidden_members.contains(&scope.id) {
            return Ok(Vec::new());
        }
        if let Some(members) = self.member_overrides.get(&scope.id) {
            return Ok(members.clone());
        }
        let parent = (!scope.is_module()).then_some(scope.id);
        let mut members: Vec<ScopeHandle> = self
            .entries
            .iter()
            .filter(|entry| entry.parent == parent)
            .map(|entry| entry.handle.clone())
            .collect();
        members.sort_by_key(|member| member.span.map(|span| span.start));
        Ok(members)
    }

    fn parent_of(&self, scope: &ScopeHandle) -> Result<Option<ScopeHandle>, OracleError> {
        if scope.is_module() {
            return Ok(None);
        }
        let parent = self.entry(scope.id).and_then(|entry| entry.parent);
        Ok(Some(match parent.and_then(|id| self.entry(id)) {
            Some(entry) => entry.handle.clone(),
            None => self.module(),
        }))
    }

    fn resolve_references(
        &self,
        _file: &Path,
        line: usize,
        column: usize,
    ) -> Result<Vec<ScopeHandle>, OracleError> {
        Ok(self
            .references
            .get(&(line, column))
            .cloned()
            .unwrap_or_default())
    }
}

/// Throwaway git repository driven through the `git` binary.
pub(crate) struct GitFixture {
    dir: TempDir,
}

impl GitFixture {
    /// `None` when no `git` binary is available.
    pub(crate) fn new() -> Result<Option<Self>> {
        if Command::new("git").arg("--version").output().is_err() {
            return Ok(None);
        }
        let fixture = Self {
            dir: tempfile::tempdir()?,
        };
        fixture.git(&["init", "--quiet"])?;
        Ok(Some(fixture))
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn write(&self, relative: &str, text: &str) -> Result<()> {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))
    }

    pub(crate) fn remove(&self, relative: &str) -> Result<()> {
        fs::remove_file(self.path().join(relative))?;
        Ok(())
    }

    /// Stage everything and commit, returning the new commit hash.
    pub(crate) fn commit(&self, message: &str) -> Result<String> {
        self.git(&["add", "--all"])?;
        self.git(&[
            "-c",
            "user.name=Fixture",
            "-c",
            "user.email=fixture@example.com",
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "-m",
            message,
        ])?;
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("running git {args:?}"))?;
        if !output.status.success() {
            bail!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
