//! Batch driver: read commit rows, run jobs per repository in parallel, write a summary.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::app::filter::FileFilter;
use crate::app::job::{JobOutcome, JobSettings, already_mined, run_commit_job};
use crate::domain::record::CommitRow;

pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Worker threads; `0` lets rayon decide.
    pub jobs: usize,
    pub fail_fast: bool,
}

/// Outcome counts of a batch, persisted as `summary.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub started_at: String,
    pub finished_at: String,
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_commits: Vec<String>,
}

/// Parse JSON Lines rows, ignoring blank lines.
pub fn read_rows(path: &Path) -> Result<Vec<CommitRow>> {
    let file = fs::File::open(path)
        .with_context(|| format!("failed to open input rows: {}", path.display()))?;
    let mut rows = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: CommitRow = serde_json::from_str(&line)
            .with_context(|| format!("invalid row on line {} of {}", idx + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Rows grouped by repository, each group in input order.
pub fn group_by_repo(rows: Vec<CommitRow>) -> Vec<Vec<CommitRow>> {
    let mut groups: BTreeMap<String, Vec<CommitRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.repo.clone()).or_default().push(row);
    }
    groups.into_values().collect()
}

#[derive(Debug, Default)]
struct Tally {
    written: usize,
    skipped: usize,
    failed: Vec<String>,
    first_error: Option<anyhow::Error>,
}

/// Run every row. Repositories are processed in parallel, commits of one repository in order.
pub fn run_batch(
    rows: Vec<CommitRow>,
    filter: &FileFilter,
    settings: &JobSettings,
    options: BatchOptions,
) -> Result<BatchSummary> {
    let started_at = now_rfc3339()?;
    let total = rows.len();
    let groups = group_by_repo(rows);
    tracing::info!(commits = total, repositories = groups.len(), "starting batch");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()
        .context("failed to build worker pool")?;
    let tally = Mutex::new(Tally::default());
    let abort = AtomicBool::new(false);

    pool.install(|| {
        groups.par_iter().for_each(|group| {
            for row in group {
                if abort.load(Ordering::Relaxed) {
                    return;
                }
                let outcome = if settings.resume && already_mined(&settings.output_dir, &row.commit) {
                    tracing::debug!(commit = %row.commit, "already mined, skipping");
                    Ok(JobOutcome::Skipped {
                        reason: "already mined".into(),
                    })
                } else {
                    run_commit_job(row, filter, settings)
                };

                let Ok(mut guard) = tally.lock() else {
                    abort.store(true, Ordering::Relaxed);
                    return;
                };
                match outcome {
                    Ok(JobOutcome::Written { .. }) => guard.written += 1,
                    Ok(JobOutcome::Skipped { .. }) => guard.skipped += 1,
                    Err(err) => {
                        tracing::error!(
                            commit = %row.commit,
                            repo = %row.repo,
                            row = %serde_json::to_string(row).unwrap_or_default(),
                            "commit job failed: {err:#}"
                        );
                        guard.failed.push(row.commit.clone());
                        if options.fail_fast {
                            abort.store(true, Ordering::Relaxed);
                            if guard.first_error.is_none() {
                                guard.first_error = Some(err);
                            }
                        }
                    }
                }
            }
        });
    });

    let tally = tally
        .into_inner()
        .map_err(|_| anyhow!("batch bookkeeping was poisoned by a panicking job"))?;
    let summary = BatchSummary {
        started_at,
        finished_at: now_rfc3339()?,
        total,
        written: tally.written,
        skipped: tally.skipped,
        failed: tally.failed.len(),
        failed_commits: tally.failed,
    };
    write_summary(&settings.output_dir, &summary)?;
    tracing::info!(
        written = summary.written,
        skipped = summary.skipped,
        failed = summary.failed,
        "batch finished"
    );

    match tally.first_error {
        Some(err) => Err(err.context("batch stopped on first failure")),
        None => Ok(summary),
    }
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("failed to format timestamp")
}

fn write_summary(output_dir: &Path, summary: &BatchSummary) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let path = output_dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
}
