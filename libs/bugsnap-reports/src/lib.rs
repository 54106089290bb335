use anyhow::{Context, Result};
use bugsnap_core::BugReport;
use std::io::ErrorKind;
use std::path::Path;

/// Drop every byte outside printable ASCII plus tab/newline/carriage-return.
/// Tracker exports occasionally embed raw binary fragments that abort the
/// XML parser, so the stream is scrubbed before parsing.
pub fn sanitize_xml(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .copied()
        .filter(|b| matches!(b, 0x09 | 0x0A | 0x0D | 0x20..=0x7E))
        .collect()
}

/// Parse one tracker dump into flat records.
///
/// Returns `Ok(None)` when the file does not exist; the caller skips the
/// project. Any other read or parse failure is an error for that project.
pub fn retrieve_bug_reports(xml_path: &Path) -> Result<Option<Vec<BugReport>>> {
    let raw = match std::fs::read(xml_path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", xml_path.display())),
    };

    let reports = parse_bug_reports(&raw)
        .with_context(|| format!("parse {}", xml_path.display()))?;
    Ok(Some(reports))
}

/// Parse sanitized bytes following the `database/table/entry[@name]` shape:
/// every table element under a `database` element becomes one record, every
/// child with a `name` attribute one field.
pub fn parse_bug_reports(raw: &[u8]) -> Result<Vec<BugReport>> {
    let clean = sanitize_xml(raw);
    // Sanitized bytes are 7-bit ASCII, so this conversion cannot fail.
    let text = String::from_utf8(clean)?;
    let doc = roxmltree::Document::parse(&text)?;

    let root = doc.root_element();
    let mut reports = Vec::new();
    if root.tag_name().name() == "database" {
        collect_tables(root, &mut reports);
    } else {
        for db in root
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "database")
        {
            collect_tables(db, &mut reports);
        }
    }
    Ok(reports)
}

fn collect_tables(database: roxmltree::Node<'_, '_>, out: &mut Vec<BugReport>) {
    for table in database.children().filter(|n| n.is_element()) {
        let mut report = BugReport::new();
        for entry in table.children().filter(|n| n.is_element()) {
            if let Some(name) = entry.attribute("name") {
                report.push(name, entry.text().unwrap_or(""));
            }
        }
        out.push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
<bugrepository>
  <database>
    <table>
      <column name="bug_id">81</column>
      <column name="summary">NPE on startup</column>
      <column name="commit">abc123</column>
    </table>
    <table>
      <column name="bug_id">82</column>
      <column name="status">RESOLVED</column>
    </table>
  </database>
</bugrepository>
"#;

    #[test]
    fn one_record_per_table_with_entry_names_as_columns() {
        let reports = parse_bug_reports(SAMPLE.as_bytes()).unwrap();
        assert_eq!(reports.len(), 2);

        assert_eq!(reports[0].get("bug_id"), Some("81"));
        assert_eq!(reports[0].get("summary"), Some("NPE on startup"));
        assert_eq!(reports[0].commit(), Some("abc123"));

        assert_eq!(reports[1].get("status"), Some("RESOLVED"));
        assert_eq!(reports[1].commit(), None);
    }

    #[test]
    fn root_may_itself_be_the_database_element() {
        let xml = r#"<database>
  <table><column name="commit">abc123</column></table>
  <table><column name="status">RESOLVED</column></table>
</database>"#;
        let reports = parse_bug_reports(xml.as_bytes()).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].commit(), Some("abc123"));
        assert_eq!(reports[1].get("status"), Some("RESOLVED"));
    }

    #[test]
    fn sanitize_is_identity_on_clean_ascii() {
        let clean = SAMPLE.as_bytes();
        assert_eq!(sanitize_xml(clean), clean);
    }

    #[test]
    fn sanitize_strips_exactly_the_binary_garbage() {
        let mut dirty = Vec::new();
        dirty.extend_from_slice(b"<database><table><column name=\"commit\">");
        dirty.extend_from_slice(&[0x00, 0xFF, 0x1B]);
        dirty.extend_from_slice(b"abc123</column></table></database>");

        let reports = parse_bug_reports(&dirty).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].commit(), Some("abc123"));
    }

    #[test]
    fn missing_file_is_none_not_an_error() {
        let td = tempfile::TempDir::new().unwrap();
        let absent = td.path().join("NoSuchProject.xml");
        assert!(retrieve_bug_reports(&absent).unwrap().is_none());
    }

    #[test]
    fn present_file_parses_through_the_same_path() {
        let td = tempfile::TempDir::new().unwrap();
        let path = td.path().join("Sample.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let reports = retrieve_bug_reports(&path).unwrap().unwrap();
        assert_eq!(reports.len(), 2);
    }

    #[test]
    fn malformed_xml_after_sanitizing_is_an_error() {
        let broken = b"<database><table></database>";
        assert!(parse_bug_reports(broken).is_err());
    }

    #[test]
    fn entries_without_a_name_attribute_are_ignored() {
        let xml = r#"<database><table>
  <column>loose text</column>
  <column name="commit">abc123</column>
</table></database>"#;
        let reports = parse_bug_reports(xml.as_bytes()).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].len(), 1);
    }
}
