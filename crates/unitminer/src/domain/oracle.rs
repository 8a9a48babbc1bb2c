//! Port to the symbol resolution service the resolvers consume.

use std::path::Path;

use crate::domain::errors::OracleError;
use crate::domain::model::{LineSpan, ScopeHandle};

/// Scope and name queries against one on-disk project snapshot.
///
/// An implementation must be rebuilt whenever the working tree changes; handles it issued
/// are only meaningful for the snapshot it was built on.
pub trait SymbolOracle {
    /// Innermost class or function containing `line`, or the module scope.
    fn scope_at(&self, file: &Path, line: usize) -> Result<ScopeHandle, OracleError>;

    /// Named definitions directly inside `scope`, ordered by position.
    fn members_of(&self, scope: &ScopeHandle) -> Result<Vec<ScopeHandle>, OracleError>;

    /// Enclosing scope, `None` for the module scope.
    fn parent_of(&self, scope: &ScopeHandle) -> Result<Option<ScopeHandle>, OracleError>;

    fn definition_span(&self, scope: &ScopeHandle) -> Result<Option<LineSpan>, OracleError> {
        Ok(scope.span)
    }

    /// Definitions the name at (`line`, `column`) refers to. Columns are 0-based character
    /// offsets.
    fn resolve_references(
        &self,
        file: &Path,
        line: usize,
        column: usize,
    ) -> Result<Vec<ScopeHandle>, OracleError>;
}

impl<T: SymbolOracle + ?Sized> SymbolOracle for &T {
    fn scope_at(&self, file: &Path, line: usize) -> Result<ScopeHandle, OracleError> {
        (**self).scope_at(file, line)
    }

    fn members_of(&self, scope: &ScopeHandle) -> Result<Vec<ScopeHandle>, OracleError> {
        (**self).members_of(scope)
    }

    fn parent_of(&self, scope: &ScopeHandle) -> Result<Option<ScopeHandle>, OracleError> {
        (**self).parent_of(scope)
    }

    fn definition_span(&self, scope: &ScopeHandle) -> Result<Option<LineSpan>, OracleError> {
        (**self).definition_span(scope)
    }

    fn resolve_references(
        &self,
        file: &Path,
        line: usize,
        column: usize,
    ) -> Result<Vec<ScopeHandle>, OracleError> {
        (**self).resolve_references(file, line, column)
    }
}
