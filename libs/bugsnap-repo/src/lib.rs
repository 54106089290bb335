use git2::build::CheckoutBuilder;
use git2::{Commit, Delta, Repository};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use unicase::UniCase;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("commit not found: {rev}")]
    MissingCommit { rev: String },
    #[error("commit {rev} has no parent")]
    NoParent { rev: String },
    #[error("checkout of parent of {rev} failed: {source}")]
    Checkout { rev: String, source: git2::Error },
    #[error("clone {url} failed: {source}")]
    Clone { url: String, source: git2::Error },
    #[error("repository has no working tree")]
    Bare,
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Fixed commit and its unique first ancestor, as hex ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPair {
    pub fixed: String,
    pub parent: String,
}

/// Reuse an existing clone at `dir`, otherwise clone from `url`.
/// Reruns treat a present directory as an already satisfied clone.
pub fn open_or_clone(url: &str, dir: &Path) -> Result<Repository> {
    if dir.exists() {
        return Ok(Repository::open(dir)?);
    }
    Repository::clone(url, dir).map_err(|source| SnapshotError::Clone {
        url: url.to_string(),
        source,
    })
}

fn resolve_commits<'r>(repo: &'r Repository, rev: &str) -> Result<(Commit<'r>, Commit<'r>)> {
    let fixed = repo
        .revparse_single(rev)
        .and_then(|obj| obj.peel_to_commit())
        .map_err(|_| SnapshotError::MissingCommit {
            rev: rev.to_string(),
        })?;
    let parent = fixed.parent(0).map_err(|_| SnapshotError::NoParent {
        rev: rev.to_string(),
    })?;
    Ok((fixed, parent))
}

/// Resolve the `(fixed, parent)` pair for a fixed commit.
pub fn resolve_commit_pair(repo: &Repository, rev: &str) -> Result<CommitPair> {
    let (fixed, parent) = resolve_commits(repo, rev)?;
    Ok(CommitPair {
        fixed: fixed.id().to_string(),
        parent: parent.id().to_string(),
    })
}

/// Materialize the pre-fix snapshot for `rev` into a zip at `archive_path`.
///
/// The archive holds the union of (a) every path changed between the parent
/// and the fixed commit whose change is not a pure addition, and (b) every
/// `.{ext}` file in the parent working tree. Entry names are repo-relative
/// paths flattened with `-`.
///
/// Checks out the parent commit into the repository's shared working tree,
/// so calls against one repository must run strictly in sequence.
///
/// Returns `Ok(false)` without touching the repository when `archive_path`
/// already exists, `Ok(true)` after writing a new archive. The zip is built
/// at a `.tmp` sibling and renamed into place, so a half-written archive
/// from a killed process never shadows a real one.
pub fn archive_parent_snapshot(
    repo: &Repository,
    rev: &str,
    archive_path: &Path,
    ext: &str,
) -> Result<bool> {
    if archive_path.exists() {
        return Ok(false);
    }

    let (fixed, parent) = resolve_commits(repo, rev)?;

    // Changed paths that existed before the fix. Additions are skipped:
    // a file introduced by the fix has no pre-fix version to archive.
    let diff = repo.diff_tree_to_tree(Some(&parent.tree()?), Some(&fixed.tree()?), None)?;
    let mut members: BTreeSet<String> = BTreeSet::new();
    for delta in diff.deltas() {
        if delta.status() == Delta::Added {
            continue;
        }
        if let Some(path) = delta.old_file().path() {
            members.insert(path.to_string_lossy().replace('\\', "/"));
        }
    }

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(parent.as_object(), Some(&mut checkout))
        .and_then(|_| repo.set_head_detached(parent.id()))
        .map_err(|source| SnapshotError::Checkout {
            rev: rev.to_string(),
            source,
        })?;

    let workdir = repo.workdir().ok_or(SnapshotError::Bare)?;
    for rel in crawl_with_extension(workdir, ext) {
        members.insert(rel);
    }

    let mut ordered: Vec<String> = members.into_iter().collect();
    ordered.sort_by(|a, b| {
        UniCase::new(a.as_str())
            .cmp(&UniCase::new(b.as_str()))
            .then_with(|| a.cmp(b))
    });

    write_archive(workdir, &ordered, archive_path)?;
    Ok(true)
}

/// Walk the checked-out tree and collect repo-relative paths of every file
/// with the given extension. The `.git` directory is not part of the
/// snapshot.
fn crawl_with_extension(workdir: &Path, ext: &str) -> Vec<String> {
    let suffix = format!(".{ext}");
    let mut out = Vec::new();
    for entry in WalkDir::new(workdir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(workdir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if rel.starts_with(".git/") || rel.contains("/.git/") {
            continue;
        }
        if rel.ends_with(&suffix) {
            out.push(rel);
        }
    }
    out
}

fn write_archive(workdir: &Path, members: &[String], archive_path: &Path) -> Result<()> {
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "archive".to_string());
    let tmp_path = archive_path.with_file_name(format!("{file_name}.tmp"));

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let tmp = std::fs::File::create(&tmp_path)?;
    let mut zip = ZipWriter::new(tmp);

    for rel in members {
        let full = workdir.join(rel);
        // Diff paths may name blobs the checkout cannot materialize
        // (e.g. submodule entries); those are not files on disk.
        if !full.is_file() {
            continue;
        }
        zip.start_file(rel.replace('/', "-"), options)?;
        zip.write_all(&std::fs::read(&full)?)?;
    }
    zip.finish()?;

    std::fs::rename(&tmp_path, archive_path)?;
    Ok(())
}
