use anyhow::Result;
use bugsnap_core::{BugReport, INPUT_PATH_COLUMN};
use std::path::Path;

/// Header for the index: the union of every record's columns in first-seen
/// order, with `input_path` appended. Deriving the header from the first
/// record alone would silently drop columns that only later records carry.
pub fn index_columns(reports: &[(BugReport, String)]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for (report, _) in reports {
        for col in report.columns() {
            if col != INPUT_PATH_COLUMN && !columns.iter().any(|c| c == col) {
                columns.push(col.to_string());
            }
        }
    }
    columns.push(INPUT_PATH_COLUMN.to_string());
    columns
}

/// Serialize the enriched records to a CSV file. Missing columns render as
/// empty strings.
pub fn write_index(path: &Path, reports: &[(BugReport, String)]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let columns = index_columns(reports);
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;

    for (report, input_path) in reports {
        let row: Vec<&str> = columns
            .iter()
            .map(|col| {
                if col == INPUT_PATH_COLUMN {
                    input_path.as_str()
                } else {
                    report.get(col).unwrap_or("")
                }
            })
            .collect();
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
