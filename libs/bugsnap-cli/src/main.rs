use anyhow::Result;
use bugsnap_core::{default_projects, load_projects, ProjectSpec, ProjectSummary, RunSummary};
use bugsnap_indexer::Pipeline;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bugsnap", version, about = "Bug-report dataset preparation CLI")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline over the project table.
    Run(RunArgs),
    /// Parse one report dump and show what it contains.
    Reports(ReportsArgs),
    /// Archive the pre-fix snapshot for a single commit.
    Snapshot(SnapshotArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory holding the per-project XML dumps.
    #[arg(long)]
    data_dir: PathBuf,

    /// Directory receiving per-project archives and index files.
    #[arg(long)]
    out_dir: PathBuf,

    /// Directory holding (or receiving) the repository clones.
    #[arg(long)]
    repos_dir: PathBuf,

    /// JSON file replacing the built-in project table.
    #[arg(long)]
    projects: Option<PathBuf>,

    /// Restrict the run to the named projects (repeatable).
    #[arg(long = "project")]
    project_filter: Vec<String>,

    /// Emit a machine-readable run summary.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ReportsArgs {
    /// Path to one bug-report XML dump.
    #[arg(long)]
    xml: PathBuf,

    /// Emit JSON (machine-readable).
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct SnapshotArgs {
    /// Path to a local repository clone.
    #[arg(long)]
    repo: PathBuf,

    /// Fixed commit whose parent snapshot is wanted.
    #[arg(long)]
    commit: String,

    /// Output archive path.
    #[arg(long)]
    out: PathBuf,

    /// Source-file extension swept into the snapshot.
    #[arg(long, default_value = "java")]
    ext: String,
}

#[derive(Serialize)]
struct ReportsProbe {
    xml_path: String,
    found: bool,
    report_count: usize,
    columns: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => handle_run(args),
        Command::Reports(args) => handle_reports(args),
        Command::Snapshot(args) => handle_snapshot(args),
    }
}

fn select_projects(args: &RunArgs) -> Result<Vec<ProjectSpec>> {
    let table = match &args.projects {
        Some(path) => load_projects(path)?,
        None => default_projects(),
    };
    if args.project_filter.is_empty() {
        return Ok(table);
    }
    for name in &args.project_filter {
        if !table.iter().any(|p| &p.name == name) {
            anyhow::bail!("unknown project: {name}");
        }
    }
    Ok(table
        .into_iter()
        .filter(|p| args.project_filter.contains(&p.name))
        .collect())
}

fn handle_run(args: RunArgs) -> Result<()> {
    let projects = select_projects(&args)?;
    let mut pipe = Pipeline::new(
        args.data_dir.clone(),
        args.out_dir.clone(),
        args.repos_dir.clone(),
    );
    pipe.quiet = args.json;

    let mut summaries: Vec<ProjectSummary> = Vec::with_capacity(projects.len());
    for spec in &projects {
        if !args.json {
            println!("OK: processing {}", spec.name);
        }
        match pipe.run_project(spec) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                // Project-level failure: log, keep going with the rest.
                eprintln!("ERR: {}: {e:#}", spec.name);
                summaries.push(ProjectSummary::failed(&spec.name, &e));
            }
        }
    }

    let summary = RunSummary {
        ok: summaries.iter().all(|s| s.error.is_none()),
        projects: summaries,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let processed = summary.projects.iter().filter(|s| !s.skipped).count();
    let skipped = summary.projects.len() - processed;
    println!("OK: processed {processed} projects ({skipped} skipped)");
    Ok(())
}

fn handle_reports(args: ReportsArgs) -> Result<()> {
    let probe = match bugsnap_reports::retrieve_bug_reports(&args.xml)? {
        Some(reports) => {
            let mut columns: Vec<String> = Vec::new();
            for report in &reports {
                for col in report.columns() {
                    if !columns.iter().any(|c| c == col) {
                        columns.push(col.to_string());
                    }
                }
            }
            ReportsProbe {
                xml_path: args.xml.to_string_lossy().to_string(),
                found: true,
                report_count: reports.len(),
                columns,
            }
        }
        None => ReportsProbe {
            xml_path: args.xml.to_string_lossy().to_string(),
            found: false,
            report_count: 0,
            columns: Vec::new(),
        },
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
        return Ok(());
    }

    if !probe.found {
        println!("ERR: no report dump at {}", probe.xml_path);
        return Ok(());
    }
    println!(
        "OK: parsed {} reports ({} columns)",
        probe.report_count,
        probe.columns.len()
    );
    if !probe.columns.is_empty() {
        println!("columns: {}", probe.columns.join(", "));
    }
    Ok(())
}

fn handle_snapshot(args: SnapshotArgs) -> Result<()> {
    let repo = git2::Repository::open(&args.repo)?;
    let wrote = bugsnap_repo::archive_parent_snapshot(&repo, &args.commit, &args.out, &args.ext)?;
    if wrote {
        println!("OK: wrote {}", args.out.display());
    } else {
        println!("OK: archive already exists at {}", args.out.display());
    }
    Ok(())
}
