//! Selection of the changed files worth extracting units from.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::infra::config::Config;

/// Extractor a file is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Scope-aware resolution through the symbol oracle.
    Scoped,
    /// Changed lines taken verbatim.
    Raw,
}

/// Why a changed file is left out of a commit job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    TestPath,
    Extension(String),
    TestPatch(String),
    Language(String),
}

#[derive(Debug, Clone)]
pub struct FileFilter {
    test_paths: GlobSet,
    extensions: Vec<String>,
    patch_markers: Vec<String>,
    scoped: Vec<String>,
    raw: Vec<String>,
}

impl FileFilter {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.filter.exclude_globs {
            let glob = GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid exclude glob: {pattern}"))?;
            builder.add(glob);
        }
        Ok(Self {
            test_paths: builder.build().context("failed to build exclude globs")?,
            extensions: config
                .filter
                .exclude_extensions
                .iter()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
            patch_markers: config.filter.patch_markers.clone(),
            scoped: config.languages.python.clone(),
            raw: config.languages.raw.clone(),
        })
    }

    /// Route a changed file, or say why it is excluded.
    pub fn route(&self, file: &str, patch: &str, language: &str) -> Result<Extractor, Exclusion> {
        if self.test_paths.is_match(file) {
            return Err(Exclusion::TestPath);
        }
        if let Some((_, ext)) = file.rsplit_once('.')
            && self.extensions.contains(&ext.to_ascii_lowercase())
        {
            return Err(Exclusion::Extension(ext.to_string()));
        }
        if let Some(marker) = self.patch_markers.iter().find(|marker| patch.contains(marker.as_str())) {
            return Err(Exclusion::TestPatch(marker.clone()));
        }
        if self.scoped.iter().any(|label| label == language) {
            Ok(Extractor::Scoped)
        } else if self.raw.iter().any(|label| label == language) {
            Ok(Extractor::Raw)
        } else {
            Err(Exclusion::Language(language.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> Result<FileFilter> {
        let mut config = Config::default();
        config.filter.exclude_globs = vec!["tests/**".into(), "**/test/**".into()];
        config.filter.exclude_extensions = vec!["md".into(), "toml".into()];
        config.filter.patch_markers = vec!["pytest".into()];
        FileFilter::from_config(&config)
    }

    #[test]
    fn routes_languages_to_extractors() -> Result<()> {
        let filter = filter()?;
        assert_eq!(filter.route("app/views.py", "", "Python"), Ok(Extractor::Scoped));
        assert_eq!(filter.route("static/app.js", "", "JavaScript/TypeScript"), Ok(Extractor::Raw));
        assert_eq!(
            filter.route("build.gradle", "", "Groovy"),
            Err(Exclusion::Language("Groovy".into()))
        );
        Ok(())
    }

    #[test]
    fn excludes_tests_docs_and_test_patches() -> Result<()> {
        let filter = filter()?;
        assert_eq!(filter.route("Tests/test_x.py", "", "Python"), Err(Exclusion::TestPath));
        assert_eq!(filter.route("pkg/test/util.py", "", "Python"), Err(Exclusion::TestPath));
        assert_eq!(
            filter.route("README.MD", "", "Markdown"),
            Err(Exclusion::Extension("MD".into()))
        );
        assert_eq!(
            filter.route("pkg/a.py", "+import pytest\n", "Python"),
            Err(Exclusion::TestPatch("pytest".into()))
        );
        assert!(filter.route("pkg/testing.py", "", "Python").is_ok());
        Ok(())
    }
}
