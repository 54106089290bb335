use anyhow::{Context, Result};
use bugsnap_core::{
    archive_file_name, project_out_dir, ProjectSpec, ProjectSummary, INDEX_FILE_NAME,
};
use bugsnap_repo::{archive_parent_snapshot, open_or_clone};
use git2::Repository;
use std::path::PathBuf;

use crate::index::write_index;

/// Sequential per-project pipeline: extract reports, resolve each commit's
/// pre-fix snapshot, write the CSV index.
///
/// One `Repository` handle is shared across all reports of a project and its
/// working tree mutates on every resolution, so reports are processed
/// strictly in order.
pub struct Pipeline {
    pub data_dir: PathBuf,
    pub out_root: PathBuf,
    pub repos_root: PathBuf,
    pub source_ext: String,
    /// Suppress OK status lines (errors still go to stderr). Set when the
    /// caller emits machine-readable output on stdout.
    pub quiet: bool,
}

impl Pipeline {
    pub fn new(data_dir: PathBuf, out_root: PathBuf, repos_root: PathBuf) -> Self {
        Self {
            data_dir,
            out_root,
            repos_root,
            source_ext: bugsnap_core::DEFAULT_SOURCE_EXT.to_string(),
            quiet: false,
        }
    }

    pub fn run_project(&self, spec: &ProjectSpec) -> Result<ProjectSummary> {
        let xml_path = self.data_dir.join(&spec.xml_file);
        let Some(reports) = bugsnap_reports::retrieve_bug_reports(&xml_path)? else {
            if !self.quiet {
                println!("OK: {} has no report dump, skipping", spec.name);
            }
            return Ok(ProjectSummary::skipped(&spec.name));
        };
        if !self.quiet {
            println!("OK: {} parsed {} reports", spec.name, reports.len());
        }

        let out_dir = project_out_dir(&self.out_root, &spec.name);
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("create {}", out_dir.display()))?;

        // The clone is only materialized once a report actually names a
        // commit; a dump with no commit column never touches the repository.
        let mut repo: Option<Repository> = None;
        let mut rows = Vec::with_capacity(reports.len());
        let mut written = 0usize;
        let mut reused = 0usize;
        let mut failures = 0usize;

        for report in reports {
            let Some(commit) = report.commit().map(str::to_string) else {
                rows.push((report, String::new()));
                continue;
            };

            let repo: &Repository = match &mut repo {
                Some(r) => r,
                slot @ None => {
                    let dir = self.repos_root.join(&spec.repo_dir);
                    let opened = open_or_clone(&spec.repo_url, &dir)
                        .with_context(|| format!("open repository for {}", spec.name))?;
                    slot.insert(opened)
                }
            };

            // Best effort: the row keeps the computed path even when the
            // archive could not be written.
            let archive = out_dir.join(archive_file_name(&commit));
            match archive_parent_snapshot(repo, &commit, &archive, &self.source_ext) {
                Ok(true) => written += 1,
                Ok(false) => reused += 1,
                Err(e) => {
                    failures += 1;
                    eprintln!("ERR: {} commit {commit}: {e}", spec.name);
                }
            }
            rows.push((report, archive.to_string_lossy().to_string()));
        }

        let index_path = out_dir.join(INDEX_FILE_NAME);
        write_index(&index_path, &rows)
            .with_context(|| format!("write {}", index_path.display()))?;
        if !self.quiet {
            println!("OK: {} index saved to {}", spec.name, index_path.display());
        }

        Ok(ProjectSummary {
            project: spec.name.clone(),
            skipped: false,
            report_count: rows.len(),
            snapshots_written: written,
            snapshots_reused: reused,
            failures,
            index_path: index_path.to_string_lossy().to_string(),
            error: None,
        })
    }
}
