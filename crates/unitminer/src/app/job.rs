//! One commit job: check out both sides of a fix commit and extract a record per file.
//!
//! A job is the unit of failure. Records are only written once every file of the commit
//! has been extracted on both sides.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::app::boundary::ScopeResolver;
use crate::app::extract::{ExtractOptions, Extraction, extract_raw, extract_scoped};
use crate::app::filter::{Extractor, FileFilter};
use crate::domain::errors::{ResolveError, VcsError};
use crate::domain::record::{CodeUnitRecord, CommitRow, ContextRecord};
use crate::infra::git::{ChangeKind, GitCheckout};
use crate::infra::outline::OutlineOracle;
use crate::infra::patch::parse_patch;

pub const CODE_UNITS_DIR: &str = "code_units";
pub const CONTEXT_DIR: &str = "context";

/// Settings shared by every job of a batch.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub repos_dir: PathBuf,
    pub output_dir: PathBuf,
    pub extract: ExtractOptions,
    /// Skip commits whose code units were already written.
    pub resume: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Written { commit: String, files: usize },
    Skipped { reason: String },
}

/// One changed file as it will be extracted on both sides.
#[derive(Debug, Clone)]
struct PlannedFile {
    new_file: Option<String>,
    old_file: Option<String>,
    patch: String,
    extractor: Extractor,
    added: BTreeSet<usize>,
    removed: BTreeSet<usize>,
}

/// Run the whole job for one input row.
pub fn run_commit_job(row: &CommitRow, filter: &FileFilter, settings: &JobSettings) -> Result<JobOutcome> {
    let checkout = GitCheckout::open_or_clone(&settings.repos_dir, &row.repo, row.commit_source)
        .with_context(|| format!("failed to open repository {}", row.repo))?;

    let fix = match checkout.resolve(&row.commit) {
        Ok(fix) => fix,
        Err(err @ VcsError::CommitNotFound { .. }) => {
            tracing::warn!(repo = %row.repo, commit = %row.commit, "{err}, skipping");
            return Ok(JobOutcome::Skipped {
                reason: err.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };
    if settings.resume && already_mined(&settings.output_dir, &fix) {
        tracing::debug!(repo = %row.repo, commit = %fix, "already mined, skipping");
        return Ok(JobOutcome::Skipped {
            reason: "already mined".into(),
        });
    }
    let Some(parent) = checkout.parent_of(&fix)? else {
        tracing::warn!(repo = %row.repo, commit = %fix, "root commit has no parent, skipping");
        return Ok(JobOutcome::Skipped {
            reason: format!("{fix} is a root commit"),
        });
    };

    checkout
        .checkout(&fix)
        .with_context(|| format!("failed to check out fix commit {fix}"))?;
    let changes: HashMap<String, ChangeKind> = checkout
        .diff_files(&parent, &fix)?
        .into_iter()
        .map(|change| (change.path, change.kind))
        .collect();

    let planned = plan_files(row, filter, &changes)?;
    if planned.is_empty() {
        tracing::info!(repo = %row.repo, commit = %fix, "no extractable files");
        return Ok(JobOutcome::Skipped {
            reason: "no extractable files".into(),
        });
    }

    let after = extract_side(&checkout, &planned, Side::After, &settings.extract)
        .with_context(|| format!("failed to extract fixed code of {fix}"))?;

    checkout
        .checkout(&parent)
        .with_context(|| format!("failed to check out parent commit {parent}"))?;
    let before = extract_side(&checkout, &planned, Side::Before, &settings.extract)
        .with_context(|| format!("failed to extract vulnerable code of {fix}"))?;

    let written = write_records(row, &fix, &planned, &before, &after, settings)?;
    tracing::info!(repo = %row.repo, commit = %fix, files = written, "wrote code units");
    Ok(JobOutcome::Written {
        commit: fix,
        files: written,
    })
}

/// Whether `code_units/<commit>` already exists under `output_dir`.
pub fn already_mined(output_dir: &Path, commit: &str) -> bool {
    output_dir.join(CODE_UNITS_DIR).join(commit).is_dir()
}

fn plan_files(
    row: &CommitRow,
    filter: &FileFilter,
    changes: &HashMap<String, ChangeKind>,
) -> Result<Vec<PlannedFile>> {
    let mut planned = Vec::new();
    for (file, patch, language) in row.files() {
        let extractor = match filter.route(file, patch, language) {
            Ok(extractor) => extractor,
            Err(exclusion) => {
                tracing::debug!(file, ?exclusion, "excluded from extraction");
                continue;
            }
        };

        let mut added = BTreeSet::new();
        let mut removed = BTreeSet::new();
        for patched in parse_patch(patch).with_context(|| format!("invalid patch for {file}"))? {
            added.extend(patched.added);
            removed.extend(patched.removed);
        }

        let (old_file, new_file) = match changes.get(file) {
            Some(ChangeKind::Added) => (None, Some(file.to_string())),
            Some(ChangeKind::Deleted) => (Some(file.to_string()), None),
            Some(ChangeKind::Renamed { from }) => (Some(from.clone()), Some(file.to_string())),
            Some(ChangeKind::Modified) => (Some(file.to_string()), Some(file.to_string())),
            None => {
                tracing::warn!(file, "file not reported by git diff, treating as modified");
                (Some(file.to_string()), Some(file.to_string()))
            }
        };

        planned.push(PlannedFile {
            new_file,
            old_file,
            patch: patch.to_string(),
            extractor,
            added,
            removed,
        });
    }
    Ok(planned)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Before,
    After,
}

/// Extract every planned file against the currently checked-out snapshot.
fn extract_side(
    checkout: &GitCheckout,
    planned: &[PlannedFile],
    side: Side,
    options: &ExtractOptions,
) -> Result<Vec<Extraction>> {
    let root = checkout.root();
    let mut resolver = ScopeResolver::new(OutlineOracle::new(root));
    let mut extractions = Vec::with_capacity(planned.len());

    for file in planned {
        let (path, lines) = match side {
            Side::After => (file.new_file.as_deref(), &file.added),
            Side::Before => (file.old_file.as_deref(), &file.removed),
        };
        let Some(path) = path else {
            extractions.push(Extraction::empty());
            continue;
        };

        let extracted = match file.extractor {
            Extractor::Scoped => extract_scoped(&mut resolver, root, path, lines, options),
            Extractor::Raw => extract_raw(root, path, lines, options),
        };
        let extraction = match extracted {
            Ok(extraction) => extraction,
            Err(ResolveError::Io { path: missing, .. }) if !missing.exists() => {
                tracing::warn!(file = %missing.display(), ?side, "file absent from snapshot");
                Extraction::empty()
            }
            Err(err) => return Err(err).with_context(|| format!("failed to resolve {path}")),
        };
        extractions.push(extraction);
    }
    Ok(extractions)
}

fn write_records(
    row: &CommitRow,
    fix: &str,
    planned: &[PlannedFile],
    before: &[Extraction],
    after: &[Extraction],
    settings: &JobSettings,
) -> Result<usize> {
    let units = StagedDir::create(&settings.output_dir.join(CODE_UNITS_DIR), fix)?;
    let context = match settings.extract.context {
        Some(_) => Some(StagedDir::create(&settings.output_dir.join(CONTEXT_DIR), fix)?),
        None => None,
    };

    let mut written = 0;
    for ((file, before), after) in planned.iter().zip(before).zip(after) {
        let Some(name) = file.new_file.as_deref().or(file.old_file.as_deref()) else {
            continue;
        };
        let record = CodeUnitRecord {
            commit: fix.to_string(),
            repo: row.repo.clone(),
            old_file: file.old_file.clone(),
            new_file: file.new_file.clone(),
            patch: file.patch.clone(),
            code_unit_before_fix: before.text.clone(),
            code_unit_after_fix: after.text.clone(),
            vulnerability_id: row.vulnerability_id.clone(),
            cwe_id: row.cwe_id.clone(),
        };
        write_json(units.path(), name, &record)?;

        if let Some(context_dir) = &context {
            let context_record = ContextRecord {
                commit: fix.to_string(),
                repo: row.repo.clone(),
                old_file: file.old_file.clone(),
                new_file: file.new_file.clone(),
                patch: file.patch.clone(),
                code_context_before_fix: before.context.clone(),
                code_context_after_fix: after.context.clone(),
                vulnerability_id: row.vulnerability_id.clone(),
                cwe_id: row.cwe_id.clone(),
            };
            write_json(context_dir.path(), name, &context_record)?;
        }
        written += 1;
    }

    // Code units go last: their directory marks the commit as mined.
    if let Some(context) = context {
        context.publish()?;
    }
    units.publish()?;
    Ok(written)
}

/// Output directory filled under a hidden name and renamed into place once complete.
/// Dropping it unpublished removes the partial content.
#[derive(Debug)]
struct StagedDir {
    staging: PathBuf,
    target: PathBuf,
    published: bool,
}

impl StagedDir {
    fn create(parent: &Path, name: &str) -> Result<Self> {
        let staging = parent.join(format!(".{name}.partial"));
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("failed to clear {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("failed to create {}", staging.display()))?;
        Ok(Self {
            staging,
            target: parent.join(name),
            published: false,
        })
    }

    fn path(&self) -> &Path {
        &self.staging
    }

    fn publish(mut self) -> Result<()> {
        if self.target.exists() {
            fs::remove_dir_all(&self.target)
                .with_context(|| format!("failed to replace {}", self.target.display()))?;
        }
        fs::rename(&self.staging, &self.target)
            .with_context(|| format!("failed to publish {}", self.target.display()))?;
        self.published = true;
        Ok(())
    }
}

impl Drop for StagedDir {
    fn drop(&mut self) {
        if !self.published && let Err(err) = fs::remove_dir_all(&self.staging) {
            tracing::warn!(dir = %self.staging.display(), error = %err, "failed to remove partial output");
        }
    }
}

fn write_json<T: serde::Serialize>(dir: &Path, file: &str, value: &T) -> Result<()> {
    let path = dir.join(format!("{file}.json"));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::app::test_support::GitFixture;
    use crate::domain::record::CommitSource;
    use crate::infra::config::Config;

    const BEFORE: &str = concat!(
        "import os\n",                       // 1
        "\n",                                // 2
        "def read(name):\n",                 // 3
        "    return open(name).read()\n",    // 4
        "\n",                                // 5
        "def other():\n",                    // 6
        "    return 1\n",                    // 7
    );
    const AFTER: &str = concat!(
        "import os\n",                                   // 1
        "\n",                                            // 2
        "def read(name):\n",                             // 3
        "    safe = os.path.basename(name)\n",           // 4
        "    return open(safe).read()\n",                // 5
        "\n",                                            // 6
        "def other():\n",                                // 7
        "    return 1\n",                                // 8
    );
    const PATCH: &str = "@@ -3,2 +3,3 @@\n def read(name):\n-    return open(name).read()\n+    safe = os.path.basename(name)\n+    return open(safe).read()\n";

    fn row(commit: &str) -> CommitRow {
        CommitRow {
            repo: "acme/files".into(),
            commit: commit.into(),
            commit_source: CommitSource::Github,
            vulnerability_id: "CVE-2024-0001".into(),
            cwe_id: vec!["CWE-22".into()],
            file: vec!["files/io.py".into(), "docs/notes.md".into()],
            patch: vec![PATCH.into(), "@@ -1 +1 @@\n-a\n+b\n".into()],
            language: vec!["Python".into(), "Markdown".into()],
        }
    }

    fn settings(repos: &Path, output: &Path) -> JobSettings {
        JobSettings {
            repos_dir: repos.to_path_buf(),
            output_dir: output.to_path_buf(),
            extract: ExtractOptions::default(),
            resume: false,
        }
    }

    /// Fixture repository living at `<repos>/acme/files`.
    fn fixture_repo() -> Result<Option<(GitFixture, String)>> {
        let Some(fixture) = GitFixture::new()? else {
            return Ok(None);
        };
        fixture.write("files/io.py", BEFORE)?;
        fixture.write("docs/notes.md", "a\n")?;
        fixture.commit("initial")?;
        fixture.write("files/io.py", AFTER)?;
        fixture.write("docs/notes.md", "b\n")?;
        let fix = fixture.commit("sanitize file names")?;
        Ok(Some((fixture, fix)))
    }

    fn repos_dir_for(fixture: &GitFixture) -> Result<tempfile::TempDir> {
        let repos = tempfile::tempdir()?;
        fs::create_dir_all(repos.path().join("acme"))?;
        copy_dir(fixture.path(), &repos.path().join("acme/files"))?;
        Ok(repos)
    }

    fn copy_dir(from: &Path, to: &Path) -> Result<()> {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_dir(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    #[test]
    fn writes_before_and_after_units_for_python_files() -> Result<()> {
        let Some((fixture, fix)) = fixture_repo()? else {
            return Ok(());
        };
        let repos = repos_dir_for(&fixture)?;
        let output = tempfile::tempdir()?;
        let filter = FileFilter::from_config(&Config::builtin()?)?;

        let outcome = run_commit_job(&row(&fix), &filter, &settings(repos.path(), output.path()))?;
        assert_eq!(outcome, JobOutcome::Written { commit: fix.clone(), files: 1 });

        let path = output.path().join(CODE_UNITS_DIR).join(&fix).join("files/io.py.json");
        let record: CodeUnitRecord = serde_json::from_str(&fs::read_to_string(path)?)?;
        assert_eq!(
            record.code_unit_before_fix,
            "def read(name):\n    return open(name).read()"
        );
        assert_eq!(
            record.code_unit_after_fix,
            "def read(name):\n    safe = os.path.basename(name)\n    return open(safe).read()"
        );
        assert_eq!(record.old_file.as_deref(), Some("files/io.py"));
        assert!(!output.path().join(CONTEXT_DIR).exists());
        assert!(
            !output
                .path()
                .join(CODE_UNITS_DIR)
                .join(&fix)
                .join("docs/notes.md.json")
                .exists()
        );
        Ok(())
    }

    #[test]
    fn unknown_commit_is_skipped() -> Result<()> {
        let Some((fixture, _)) = fixture_repo()? else {
            return Ok(());
        };
        let repos = repos_dir_for(&fixture)?;
        let output = tempfile::tempdir()?;
        let filter = FileFilter::from_config(&Config::builtin()?)?;

        let outcome = run_commit_job(
            &row("0123456789abcdef0123456789abcdef01234567"),
            &filter,
            &settings(repos.path(), output.path()),
        )?;
        assert!(matches!(outcome, JobOutcome::Skipped { .. }));
        assert!(!output.path().join(CODE_UNITS_DIR).exists());
        Ok(())
    }

    #[test]
    fn malformed_patch_fails_without_writing() -> Result<()> {
        let Some((fixture, fix)) = fixture_repo()? else {
            return Ok(());
        };
        let repos = repos_dir_for(&fixture)?;
        let output = tempfile::tempdir()?;
        let filter = FileFilter::from_config(&Config::builtin()?)?;
        let mut row = row(&fix);
        row.patch[0] = "@@ broken @@\n+x\n".into();

        let result = run_commit_job(&row, &filter, &settings(repos.path(), output.path()));
        assert!(result.is_err());
        assert!(!output.path().join(CODE_UNITS_DIR).exists());
        Ok(())
    }

    const KEEP_BEFORE: &str = "def keep(x):\n    y = x * 2\n    z = y + 3\n    w = z - 4\n    return w + 1\n";
    const KEEP_AFTER: &str = "def keep(x):\n    y = x * 2\n    z = y + 3\n    w = z - 4\n    return w + 5\n";

    fn read_record(output: &Path, fix: &str, name: &str) -> Result<CodeUnitRecord> {
        let path = output
            .join(CODE_UNITS_DIR)
            .join(fix)
            .join(format!("{name}.json"));
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    #[test]
    fn added_deleted_renamed_and_missing_files_get_the_right_sides() -> Result<()> {
        let Some(fixture) = GitFixture::new()? else {
            return Ok(());
        };
        fixture.write("legacy.py", "def gone():\n    return 1\n")?;
        fixture.write("src/keep.py", KEEP_BEFORE)?;
        fixture.commit("initial")?;
        fixture.remove("legacy.py")?;
        fixture.write("fresh.py", "def fresh():\n    return 2\n")?;
        fixture.remove("src/keep.py")?;
        fixture.write("lib/keep.py", KEEP_AFTER)?;
        let fix = fixture.commit("restructure")?;

        let repos = repos_dir_for(&fixture)?;
        let output = tempfile::tempdir()?;
        let filter = FileFilter::from_config(&Config::builtin()?)?;
        let row = CommitRow {
            file: vec![
                "legacy.py".into(),
                "fresh.py".into(),
                "lib/keep.py".into(),
                "ghost.py".into(),
            ],
            patch: vec![
                "@@ -1,2 +0,0 @@\n-def gone():\n-    return 1\n".into(),
                "@@ -0,0 +1,2 @@\n+def fresh():\n+    return 2\n".into(),
                "@@ -5 +5 @@\n-    return w + 1\n+    return w + 5\n".into(),
                "@@ -1 +1 @@\n-a = 1\n+a = 2\n".into(),
            ],
            language: vec!["Python".into(); 4],
            ..row(&fix)
        };

        let outcome = run_commit_job(&row, &filter, &settings(repos.path(), output.path()))?;
        assert_eq!(outcome, JobOutcome::Written { commit: fix.clone(), files: 4 });

        let deleted = read_record(output.path(), &fix, "legacy.py")?;
        assert_eq!(deleted.old_file.as_deref(), Some("legacy.py"));
        assert_eq!(deleted.new_file, None);
        assert_eq!(deleted.code_unit_before_fix, "def gone():\n    return 1");
        assert_eq!(deleted.code_unit_after_fix, "");

        let added = read_record(output.path(), &fix, "fresh.py")?;
        assert_eq!(added.old_file, None);
        assert_eq!(added.new_file.as_deref(), Some("fresh.py"));
        assert_eq!(added.code_unit_before_fix, "");
        assert_eq!(added.code_unit_after_fix, "def fresh():\n    return 2");

        let renamed = read_record(output.path(), &fix, "lib/keep.py")?;
        assert_eq!(renamed.old_file.as_deref(), Some("src/keep.py"));
        assert_eq!(renamed.new_file.as_deref(), Some("lib/keep.py"));
        assert_eq!(renamed.code_unit_before_fix, KEEP_BEFORE.trim_end());
        assert_eq!(renamed.code_unit_after_fix, KEEP_AFTER.trim_end());

        let missing = read_record(output.path(), &fix, "ghost.py")?;
        assert_eq!(missing.old_file.as_deref(), Some("ghost.py"));
        assert_eq!(missing.code_unit_before_fix, "");
        assert_eq!(missing.code_unit_after_fix, "");
        Ok(())
    }

    #[test]
    fn resume_recognises_abbreviated_commit() -> Result<()> {
        let Some((fixture, fix)) = fixture_repo()? else {
            return Ok(());
        };
        let repos = repos_dir_for(&fixture)?;
        let output = tempfile::tempdir()?;
        let mined = output.path().join(CODE_UNITS_DIR).join(&fix);
        fs::create_dir_all(&mined)?;
        let filter = FileFilter::from_config(&Config::builtin()?)?;
        let settings = JobSettings {
            resume: true,
            ..settings(repos.path(), output.path())
        };

        let outcome = run_commit_job(&row(&fix[..10]), &filter, &settings)?;
        assert!(matches!(outcome, JobOutcome::Skipped { .. }));
        assert_eq!(fs::read_dir(&mined)?.count(), 0);
        Ok(())
    }

    #[test]
    fn failed_write_leaves_no_partial_output() -> Result<()> {
        let output = tempfile::tempdir()?;
        let planned_file = |name: &str| PlannedFile {
            new_file: Some(name.to_string()),
            old_file: Some(name.to_string()),
            patch: String::new(),
            extractor: Extractor::Scoped,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
        };
        // The second record needs a directory where the first record's file already sits.
        let planned = vec![planned_file("a.py"), planned_file("a.py.json/b.py")];
        let empty = vec![Extraction::empty(), Extraction::empty()];
        let settings = settings(Path::new("/nonexistent/repos"), output.path());

        let result = write_records(&row("abc123"), "abc123", &planned, &empty, &empty, &settings);
        assert!(result.is_err());
        let units = output.path().join(CODE_UNITS_DIR);
        assert!(!units.join("abc123").exists());
        assert_eq!(fs::read_dir(&units)?.count(), 0);
        Ok(())
    }
}
