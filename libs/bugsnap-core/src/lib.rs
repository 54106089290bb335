use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Column that joins a bug report to the repository history.
pub const COMMIT_COLUMN: &str = "commit";
/// Column appended to every index row with the snapshot archive path.
pub const INPUT_PATH_COLUMN: &str = "input_path";
/// Per-project index file name.
pub const INDEX_FILE_NAME: &str = "bug_report_data.csv";
/// Extension of the source files swept into every snapshot.
pub const DEFAULT_SOURCE_EXT: &str = "java";

/// One bug report: ordered `(column, text)` pairs as they appear in the XML.
/// Order matters for index-column derivation, so this is not a map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BugReport {
    fields: Vec<(String, String)>,
}

impl BugReport {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Append a field. Later duplicates of the same column are kept but
    /// shadowed by the first one on lookup.
    pub fn push(&mut self, column: impl Into<String>, text: impl Into<String>) {
        self.fields.push((column.into(), text.into()));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Commit identifier, or `None` when the column is absent or blank.
    pub fn commit(&self) -> Option<&str> {
        self.get(COMMIT_COLUMN).filter(|c| !c.trim().is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, String)> for BugReport {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// One tracked project: where its bug-report XML lives and which repository
/// its commits resolve against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    pub xml_file: String,
    pub repo_dir: String,
    pub repo_url: String,
}

/// The built-in project table: the six tracker dumps the dataset covers.
pub fn default_projects() -> Vec<ProjectSpec> {
    fn p(name: &str, xml_file: &str, repo_dir: &str, repo_url: &str) -> ProjectSpec {
        ProjectSpec {
            name: name.to_string(),
            xml_file: xml_file.to_string(),
            repo_dir: repo_dir.to_string(),
            repo_url: repo_url.to_string(),
        }
    }
    vec![
        p(
            "Birt",
            "Birt.xml",
            "birt_repo",
            "https://github.com/eclipse-birt/birt.git",
        ),
        p(
            "Eclipse_Platform_UI",
            "Eclipse_Platform_UI.xml",
            "eclipse_ui_repo",
            "https://github.com/eclipse-platform/eclipse.platform.ui.git",
        ),
        p(
            "AspectJ",
            "AspectJ.xml",
            "aspectj_repo",
            "https://github.com/eclipse-aspectj/aspectj.git",
        ),
        p(
            "JDT",
            "JDT.xml",
            "jdt_repo",
            "https://github.com/eclipse-jdt/eclipse.jdt.ui.git",
        ),
        p(
            "SWT",
            "SWT.xml",
            "swt_repo",
            "https://github.com/eclipse-platform/eclipse.platform.swt.git",
        ),
        p(
            "Tomcat",
            "Tomcat.xml",
            "tomcat_repo",
            "https://github.com/apache/tomcat.git",
        ),
    ]
}

/// Load a replacement project table from a JSON array.
pub fn load_projects(path: &Path) -> Result<Vec<ProjectSpec>> {
    let bytes = std::fs::read(path)?;
    let projects: Vec<ProjectSpec> = serde_json::from_slice(&bytes)?;
    Ok(projects)
}

/// `<out_root>/<project>` — archives and the index CSV for one project.
pub fn project_out_dir(out_root: &Path, project: &str) -> PathBuf {
    out_root.join(project)
}

/// Archive file name for a fixed commit: `<commit>~1`.
pub fn archive_file_name(commit: &str) -> String {
    format!("{commit}~1")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project: String,
    pub skipped: bool,
    pub report_count: usize,
    pub snapshots_written: usize,
    pub snapshots_reused: usize,
    pub failures: usize,
    pub index_path: String,
    pub error: Option<String>,
}

impl ProjectSummary {
    /// Summary for a project whose XML dump is absent (skipped entirely).
    pub fn skipped(project: &str) -> Self {
        Self {
            project: project.to_string(),
            skipped: true,
            report_count: 0,
            snapshots_written: 0,
            snapshots_reused: 0,
            failures: 0,
            index_path: String::new(),
            error: None,
        }
    }

    /// Summary for a project whose processing aborted (malformed XML,
    /// unclonable repository). Later reports of that project were not
    /// touched; other projects continue.
    pub fn failed(project: &str, error: &anyhow::Error) -> Self {
        Self {
            project: project.to_string(),
            skipped: false,
            report_count: 0,
            snapshots_written: 0,
            snapshots_reused: 0,
            failures: 1,
            index_path: String::new(),
            error: Some(format!("{error:#}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub ok: bool,
    pub projects: Vec<ProjectSummary>,
}
