//! Per-file driver turning changed line numbers into the lines of a code unit.

use std::collections::BTreeSet;
use std::path::Path;

use crate::app::boundary::ScopeResolver;
use crate::app::lines::SourceFile;
use crate::domain::errors::ResolveError;
use crate::domain::model::{ChangedLines, LineSpan, ScopeHandle, ScopeKind, UnitLines};
use crate::domain::oracle::SymbolOracle;

impl<O: SymbolOracle> ScopeResolver<O> {
    /// Resolve every changed line of `file` and accumulate the union of their units.
    ///
    /// Decorator lines contribute themselves, blank lines contribute nothing, lines inside a
    /// class or function contribute their minimal enclosing unit, and module-level lines
    /// contribute the region between the surrounding top-level definitions. Oracle failures
    /// propagate; only overlapping scopes are skipped.
    pub fn map_changes_to_unit(
        &mut self,
        file: &Path,
        changed: &ChangedLines,
    ) -> Result<UnitLines, ResolveError> {
        let source = self.source(file)?;
        let mut unit = UnitLines::new();

        for &line in changed {
            if unit.contains(line) {
                continue;
            }
            let Some(text) = source.text(line) else {
                tracing::debug!(file = %file.display(), line, "changed line past end of file");
                continue;
            };
            if source.is_decorator(line) {
                unit.insert(line);
                continue;
            }
            if text.trim().is_empty() {
                continue;
            }

            let scope = self.oracle().scope_at(file, line)?;
            tracing::trace!(line, scope = %scope.describe(), "classified changed line");
            let resolved = match scope.kind {
                ScopeKind::Class => self.resolve_class_member_unit(&scope, line),
                ScopeKind::Function => self.resolve_scope_lines(&scope),
                ScopeKind::Module => self.module_region(&scope, &source, line),
                _ => Err(ResolveError::UnsupportedScopeKind {
                    kind: scope.kind.clone(),
                    scope: scope.describe(),
                }),
            };

            match resolved {
                Ok(lines) => {
                    unit.extend(lines);
                    unit.insert(line);
                }
                Err(ResolveError::OverlappingScopes { path, line }) => {
                    tracing::warn!(
                        file = %path.display(),
                        line,
                        "skipping changed line covered by overlapping scopes"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(unit)
    }

    /// Region of a module-level line: the top-level definition containing it, or the gap
    /// between the previous definition's end and the next definition's start. A module
    /// without definitions is one region.
    fn module_region(
        &mut self,
        module: &ScopeHandle,
        source: &SourceFile,
        line: usize,
    ) -> Result<BTreeSet<usize>, ResolveError> {
        let entities = self.oracle().members_of(module)?;
        let mut spans = Vec::with_capacity(entities.len());
        for entity in &entities {
            spans.push(self.decorated_span(entity)?);
        }
        if spans.windows(2).any(|pair| pair[0].end >= pair[1].start) {
            return Err(ResolveError::OverlappingScopes {
                path: module.file.clone(),
                line,
            });
        }

        let last_line = source.line_count().max(line);
        let region = if spans.is_empty() {
            LineSpan::new(1, last_line)
        } else if let Some(span) = spans.iter().find(|span| span.contains(line)) {
            *span
        } else {
            let start = spans
                .iter()
                .rev()
                .find(|span| span.end < line)
                .map_or(1, |span| span.end + 1);
            let end = spans
                .iter()
                .find(|span| span.start > line)
                .map_or(last_line, |span| span.start - 1);
            LineSpan::new(start, end)
        };
        tracing::trace!(line, ?region, "module-level region");
        Ok(region.lines().collect())
    }
}
