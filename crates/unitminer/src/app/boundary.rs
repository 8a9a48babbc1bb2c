//! Scope boundary resolution: the full line span of a definition plus the framing of every
//! enclosing class or function up to the module.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::app::lines::{SourceCache, SourceFile};
use crate::domain::errors::ResolveError;
use crate::domain::model::{LineSpan, ScopeHandle, ScopeKind};
use crate::domain::oracle::SymbolOracle;

/// Resolves scope handles into line sets using an oracle bound to one snapshot.
#[derive(Debug)]
pub struct ScopeResolver<O> {
    oracle: O,
    sources: SourceCache,
}

impl<O: SymbolOracle> ScopeResolver<O> {
    pub fn new(oracle: O) -> Self {
        Self::with_sources(oracle, SourceCache::new())
    }

    pub fn with_sources(oracle: O, sources: SourceCache) -> Self {
        Self { oracle, sources }
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn source(&mut self, path: &std::path::Path) -> Result<Arc<SourceFile>, ResolveError> {
        self.sources.get(path)
    }

    /// Lines spanned by a function or class scope, its decorators, and the framing of every
    /// enclosing scope. The module scope resolves to nothing.
    pub fn resolve_scope_lines(
        &mut self,
        scope: &ScopeHandle,
    ) -> Result<BTreeSet<usize>, ResolveError> {
        let mut lines = BTreeSet::new();
        match scope.kind {
            ScopeKind::Module => return Ok(lines),
            ScopeKind::Function | ScopeKind::Class => {}
            _ => {
                return Err(ResolveError::UnsupportedScopeKind {
                    kind: scope.kind.clone(),
                    scope: scope.describe(),
                });
            }
        }

        let span = self.decorated_span(scope)?;
        lines.extend(span.lines());

        let parent = self.oracle.parent_of(scope)?;
        self.extend_with_enclosing(parent, &mut lines)?;
        Ok(lines)
    }

    /// Walk outward from `scope` until the module, adding each level's framing lines.
    ///
    /// A class contributes only its header (declaration through the line before its first
    /// member), a function contributes its whole span.
    pub fn extend_with_enclosing(
        &mut self,
        scope: Option<ScopeHandle>,
        lines: &mut BTreeSet<usize>,
    ) -> Result<(), ResolveError> {
        let mut current = scope;
        while let Some(scope) = current {
            let framing = match scope.kind {
                ScopeKind::Module => break,
                ScopeKind::Class => {
                    let members = self.oracle.members_of(&scope)?;
                    self.class_header_span(&scope, &members)?
                }
                ScopeKind::Function => self.decorated_span(&scope)?,
                _ => {
                    return Err(ResolveError::UnsupportedScopeKind {
                        kind: scope.kind.clone(),
                        scope: scope.describe(),
                    });
                }
            };
            tracing::trace!(scope = %scope.describe(), ?framing, "enclosing scope");
            lines.extend(framing.lines());
            current = self.oracle.parent_of(&scope)?;
        }
        Ok(())
    }

    /// Span of `scope` with its decorator lines attached.
    pub(crate) fn decorated_span(&mut self, scope: &ScopeHandle) -> Result<LineSpan, ResolveError> {
        let span = self.require_span(scope)?;
        let source = self.sources.get(&scope.file)?;
        Ok(LineSpan::new(source.decorated_start(span.start), span.end))
    }

    /// Declaration and preamble of a class, excluding its members. A class without members is
    /// kept whole.
    pub(crate) fn class_header_span(
        &mut self,
        class: &ScopeHandle,
        members: &[ScopeHandle],
    ) -> Result<LineSpan, ResolveError> {
        let whole = self.decorated_span(class)?;
        let Some(first) = members.first() else {
            return Ok(whole);
        };
        let first_start = self.decorated_span(first)?.start;
        if first_start <= whole.start {
            return Ok(LineSpan::new(whole.start, whole.start));
        }
        Ok(LineSpan::new(whole.start, first_start - 1))
    }

    pub(crate) fn require_span(&self, scope: &ScopeHandle) -> Result<LineSpan, ResolveError> {
        self.oracle
            .definition_span(scope)?
            .ok_or_else(|| ResolveError::DefinitionNotFound {
                scope: scope.describe(),
            })
    }
}
