//! Domain-specific errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::model::ScopeKind;

/// Failure reported by a symbol resolution oracle.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line} is outside {path}")]
    LineOutOfRange { path: PathBuf, line: usize },
    #[error("{path} is not part of the analysed project")]
    ForeignFile { path: PathBuf },
}

/// Errors raised while resolving changed lines into code units.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("definition not found for {scope}")]
    DefinitionNotFound { scope: String },
    #[error("unsupported scope kind '{kind}' for {scope}")]
    UnsupportedScopeKind { kind: ScopeKind, scope: String },
    #[error("unsupported name kind '{kind}' for {name}")]
    UnsupportedNameKind { kind: ScopeKind, name: String },
    #[error("line {line} of {path} is covered by overlapping scopes")]
    OverlappingScopes { path: PathBuf, line: usize },
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Oracle(#[from] OracleError),
}

/// Failures of the version control checkout service.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("commit {commit} not found in {repo}")]
    CommitNotFound { repo: String, commit: String },
    #[error("checkout of {commit} failed after reset: {message}")]
    CheckoutConflict { commit: String, message: String },
    #[error("git {action} failed: {message}")]
    Git { action: String, message: String },
}
