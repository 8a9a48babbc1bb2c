//! Cross-file context: definitions referenced from a resolved unit.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::app::boundary::ScopeResolver;
use crate::domain::errors::ResolveError;
use crate::domain::model::{ContextMap, ScopeHandle, ScopeKind, UnitLines};
use crate::domain::oracle::SymbolOracle;

/// How failures while resolving referenced names are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum ContextMode {
    /// Any failure aborts collection.
    #[default]
    Strict,
    /// Failures are logged and the offending name is dropped.
    BestEffort,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Strict => "strict",
            ContextMode::BestEffort => "best-effort",
        }
    }
}

impl FromStr for ContextMode {
    type Err = ContextModeParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ContextMode::Strict),
            "best-effort" | "best_effort" | "lenient" => Ok(ContextMode::BestEffort),
            other => Err(ContextModeParseError::UnknownMode(other.to_string())),
        }
    }
}

/// Error returned when parsing a [`ContextMode`] fails.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ContextModeParseError {
    #[error("unknown context mode '{0}'")]
    UnknownMode(String),
}

impl<O: SymbolOracle> ScopeResolver<O> {
    /// Resolve every name referenced by the lines of `unit`.
    ///
    /// Definitions in other files of the same top-level package are returned per file;
    /// definitions in `file` itself are folded into `unit`. Only the lines present when the
    /// call starts are scanned.
    pub fn collect_context(
        &mut self,
        file: &Path,
        unit: &mut UnitLines,
        mode: ContextMode,
    ) -> Result<ContextMap, ResolveError> {
        let mut context = ContextMap::new();
        let Some(first) = unit.iter().next() else {
            return Ok(context);
        };
        let source = self.source(file)?;
        let package = self.oracle().scope_at(file, first)?.package_root().to_string();

        let scanned: Vec<usize> = unit.iter().collect();
        let mut seen: HashSet<ScopeHandle> = HashSet::new();

        for line in scanned {
            let Some(text) = source.text(line) else {
                continue;
            };
            for column in 0..text.chars().count() {
                let names = match self.oracle().resolve_references(file, line, column) {
                    Ok(names) => names,
                    Err(err) if mode == ContextMode::BestEffort => {
                        tracing::warn!(file = %file.display(), line, column, error = %err, "reference lookup failed");
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };

                for name in names {
                    if name.package_root() != package || !seen.insert(name.clone()) {
                        continue;
                    }
                    let lines = match self.definition_lines(&name, line) {
                        Ok(lines) => lines,
                        Err(err) if mode == ContextMode::BestEffort => {
                            tracing::warn!(name = %name.describe(), error = %err, "dropping unresolved reference");
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    if name.file == file {
                        unit.extend(lines);
                    } else if !lines.is_empty() {
                        context.add(&name.file, lines);
                    }
                }
            }
        }
        Ok(context)
    }

    /// Lines that define `name`, as referenced from `line`.
    fn definition_lines(
        &mut self,
        name: &ScopeHandle,
        line: usize,
    ) -> Result<BTreeSet<usize>, ResolveError> {
        match &name.kind {
            ScopeKind::Function | ScopeKind::Module => self.resolve_scope_lines(name),
            ScopeKind::Param => Ok(BTreeSet::from([line])),
            ScopeKind::Statement | ScopeKind::Class | ScopeKind::Instance | ScopeKind::Property => {
                Ok(self
                    .oracle()
                    .definition_span(name)?
                    .map(|span| span.lines().collect())
                    .unwrap_or_default())
            }
            ScopeKind::Other(_) => Err(ResolveError::UnsupportedNameKind {
                kind: name.kind.clone(),
                name: name.describe(),
            }),
        }
    }
}
