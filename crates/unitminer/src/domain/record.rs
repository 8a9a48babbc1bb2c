//! Input rows and output records of the mining pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Hosting provider a repository is cloned from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitSource {
    #[default]
    Github,
    Gitlab,
}

impl CommitSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitSource::Github => "github",
            CommitSource::Gitlab => "gitlab",
        }
    }

    pub fn clone_url(&self, repo: &str) -> String {
        let host = match self {
            CommitSource::Github => "github.com",
            CommitSource::Gitlab => "gitlab.com",
        };
        format!("https://{host}/{repo}.git")
    }
}

/// One vulnerability-fix commit with its per-file patches.
///
/// `file`, `patch` and `language` are parallel lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRow {
    pub repo: String,
    pub commit: String,
    #[serde(default)]
    pub commit_source: CommitSource,
    pub vulnerability_id: String,
    #[serde(default)]
    pub cwe_id: Vec<String>,
    pub file: Vec<String>,
    pub patch: Vec<String>,
    pub language: Vec<String>,
}

impl CommitRow {
    /// `(file, patch, language)` triples; surplus entries of longer lists are ignored.
    pub fn files(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.file
            .iter()
            .zip(&self.patch)
            .zip(&self.language)
            .map(|((file, patch), language)| (file.as_str(), patch.as_str(), language.as_str()))
    }
}

/// Before and after code units of one changed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeUnitRecord {
    pub commit: String,
    pub repo: String,
    pub old_file: Option<String>,
    pub new_file: Option<String>,
    pub patch: String,
    pub code_unit_before_fix: String,
    pub code_unit_after_fix: String,
    pub vulnerability_id: String,
    pub cwe_id: Vec<String>,
}

/// Cross-file context of one changed file, keyed by project-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub commit: String,
    pub repo: String,
    pub old_file: Option<String>,
    pub new_file: Option<String>,
    pub patch: String,
    pub code_context_before_fix: BTreeMap<String, String>,
    pub code_context_after_fix: BTreeMap<String, String>,
    pub vulnerability_id: String,
    pub cwe_id: Vec<String>,
}
