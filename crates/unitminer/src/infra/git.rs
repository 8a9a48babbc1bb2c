//! Git checkout service: clone, commit lookup, checkout and change kinds.
//!
//! Object lookups go through [`gix`]; working tree mutations and rename-aware diffs shell
//! out to the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::domain::errors::VcsError;
use crate::domain::record::CommitSource;

/// How a file changed between two commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed { from: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Path on the newer side (the removed path for deletions).
    pub path: String,
    pub kind: ChangeKind,
}

/// A local clone whose working tree is moved between commits.
pub struct GitCheckout {
    root: PathBuf,
    name: String,
    repo: gix::Repository,
}

impl std::fmt::Debug for GitCheckout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCheckout")
            .field("root", &self.root)
            .field("name", &self.name)
            .finish()
    }
}

impl GitCheckout {
    /// Open `<repos_dir>/<name>`, cloning it from `source` first when missing.
    pub fn open_or_clone(
        repos_dir: &Path,
        name: &str,
        source: CommitSource,
    ) -> Result<Self, VcsError> {
        let root = repos_dir.join(name);
        if !root.exists() {
            let url = source.clone_url(name);
            tracing::info!(%url, dest = %root.display(), "cloning repository");
            if let Some(parent) = root.parent() {
                std::fs::create_dir_all(parent).map_err(|err| VcsError::Git {
                    action: "clone".into(),
                    message: format!("cannot create {}: {err}", parent.display()),
                })?;
            }
            run_git(repos_dir, "clone", &["clone", "--quiet", &url, &path_arg(&root)])?;
        }
        Self::open(&root, name)
    }

    pub fn open(root: &Path, name: &str) -> Result<Self, VcsError> {
        let repo = gix::open(root).map_err(|err| VcsError::Git {
            action: "open".into(),
            message: format!("{}: {err}", root.display()),
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            name: name.to_string(),
            repo,
        })
    }

    /// Working tree root; checked-out files live below it.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full hash of `commit`, or [`VcsError::CommitNotFound`].
    pub fn resolve(&self, commit: &str) -> Result<String, VcsError> {
        let spec = format!("{commit}^{{commit}}");
        self.repo
            .rev_parse_single(spec.as_str())
            .map(|id| id.detach().to_string())
            .map_err(|_| self.not_found(commit))
    }

    /// First parent of `commit`, `None` for a root commit.
    pub fn parent_of(&self, commit: &str) -> Result<Option<String>, VcsError> {
        let spec = format!("{commit}^{{commit}}");
        let id = self
            .repo
            .rev_parse_single(spec.as_str())
            .map_err(|_| self.not_found(commit))?;
        let object = id.object().map_err(|_| self.not_found(commit))?;
        let parsed = object.try_into_commit().map_err(|err| VcsError::Git {
            action: "parent lookup".into(),
            message: err.to_string(),
        })?;
        let parent = parsed.parent_ids().next().map(|id| id.detach().to_string());
        Ok(parent)
    }

    /// Force the working tree to `commit`, resetting once if the first attempt fails.
    pub fn checkout(&self, commit: &str) -> Result<(), VcsError> {
        if let Err(first) = run_git(&self.root, "checkout", &["checkout", "--quiet", "--force", commit]) {
            tracing::warn!(repo = %self.name, commit, error = %first, "checkout failed, resetting");
            let retry = run_git(&self.root, "reset", &["reset", "--quiet", "--hard", commit])
                .and_then(|_| run_git(&self.root, "checkout", &["checkout", "--quiet", "--force", commit]));
            if let Err(err) = retry {
                return Err(VcsError::CheckoutConflict {
                    commit: commit.to_string(),
                    message: err.to_string(),
                });
            }
        }
        tracing::debug!(repo = %self.name, commit, "checked out");
        Ok(())
    }

    /// Files changed from `from` to `to`, with rename detection.
    pub fn diff_files(&self, from: &str, to: &str) -> Result<Vec<FileChange>, VcsError> {
        let output = run_git(
            &self.root,
            "diff",
            &["diff", "--name-status", "-M", "-z", from, to],
        )?;
        parse_name_status(&output)
    }

    fn not_found(&self, commit: &str) -> VcsError {
        VcsError::CommitNotFound {
            repo: self.name.clone(),
            commit: commit.to_string(),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn run_git(dir: &Path, action: &str, args: &[&str]) -> Result<String, VcsError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|err| VcsError::Git {
            action: action.to_string(),
            message: format!("failed to run git: {err}"),
        })?;
    if !output.status.success() {
        return Err(VcsError::Git {
            action: action.to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse NUL separated `git diff --name-status -z` output.
fn parse_name_status(output: &str) -> Result<Vec<FileChange>, VcsError> {
    let mut fields = output.split('\0').filter(|field| !field.is_empty());
    let mut changes = Vec::new();
    let truncated = || VcsError::Git {
        action: "diff".into(),
        message: "truncated name-status output".into(),
    };

    while let Some(status) = fields.next() {
        let path = fields.next().ok_or_else(truncated)?.to_string();
        let change = match status.chars().next() {
            Some('A') => FileChange {
                path,
                kind: ChangeKind::Added,
            },
            Some('C') => FileChange {
                path: fields.next().ok_or_else(truncated)?.to_string(),
                kind: ChangeKind::Added,
            },
            Some('D') => FileChange {
                path,
                kind: ChangeKind::Deleted,
            },
            Some('R') => {
                let to = fields.next().ok_or_else(truncated)?.to_string();
                FileChange {
                    path: to,
                    kind: ChangeKind::Renamed { from: path },
                }
            }
            _ => FileChange {
                path,
                kind: ChangeKind::Modified,
            },
        };
        changes.push(change);
    }
    Ok(changes)
}
