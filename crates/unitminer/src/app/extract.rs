//! Turning changed line numbers of one file snapshot into unit text and context text.

use std::collections::BTreeMap;
use std::path::Path;

use crate::app::boundary::ScopeResolver;
use crate::app::context::ContextMode;
use crate::app::lines::{SourceFile, render};
use crate::app::normalize::strip_comments;
use crate::domain::errors::ResolveError;
use crate::domain::model::{ChangedLines, UnitLines};
use crate::domain::oracle::SymbolOracle;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub strip_comments: bool,
    /// Collect cross-file context in the given mode; `None` disables it.
    pub context: Option<ContextMode>,
}

/// Unit of one file version together with its rendered context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub lines: UnitLines,
    pub text: String,
    /// Rendered definitions per project-relative path.
    pub context: BTreeMap<String, String>,
}

impl Extraction {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Resolve `changed` lines of `root/relative` through the oracle.
pub fn extract_scoped<O: SymbolOracle>(
    resolver: &mut ScopeResolver<O>,
    root: &Path,
    relative: &str,
    changed: &ChangedLines,
    options: &ExtractOptions,
) -> Result<Extraction, ResolveError> {
    let path = root.join(relative);
    let mut lines = resolver.map_changes_to_unit(&path, changed)?;

    let mut context = BTreeMap::new();
    if let Some(mode) = options.context {
        let collected = resolver.collect_context(&path, &mut lines, mode)?;
        for (file, wanted) in collected.iter() {
            let source = resolver.source(file)?;
            let text = finish(render(&source.select(wanted)), options);
            context.insert(display_relative(root, file), text);
        }
    }

    let source = resolver.source(&path)?;
    let text = finish(render(&source.select(lines.as_set())), options);
    tracing::debug!(file = relative, lines = lines.len(), "resolved unit");
    Ok(Extraction {
        lines,
        text,
        context,
    })
}

/// Take `changed` lines of `root/relative` verbatim.
pub fn extract_raw(
    root: &Path,
    relative: &str,
    changed: &ChangedLines,
    options: &ExtractOptions,
) -> Result<Extraction, ResolveError> {
    let source = SourceFile::load(&root.join(relative))?;
    let text = finish(render(&source.select(changed)), options);
    let lines: UnitLines = changed
        .iter()
        .copied()
        .filter(|line| *line <= source.line_count())
        .collect();
    let mut context = BTreeMap::new();
    if options.context.is_some() {
        context.insert(relative.to_string(), text.clone());
    }
    Ok(Extraction {
        lines,
        text,
        context,
    })
}

fn finish(text: String, options: &ExtractOptions) -> String {
    if options.strip_comments {
        strip_comments(&text)
    } else {
        text
    }
}

fn display_relative(root: &Path, file: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .to_string_lossy()
        .into_owned()
}
