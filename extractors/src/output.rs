use chrono::{DateTime, Utc};
use shared_types::{ExtractionError, ExtractionResult, OutputFormat, OutputRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `<UTC timestamp>-<domain>_ad.<ext>` in the current directory.
pub fn default_output_path(domain: &str, format: OutputFormat, now: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!(
        "{}-{}_ad.{}",
        now.format("%Y-%m-%dT%H%M%SZ"),
        domain,
        format.extension()
    ))
}

/// Fail early when the destination can never be written to.
pub fn check_destination(path: &Path) -> ExtractionResult<()> {
    if path.is_dir() {
        return Err(ExtractionError::io(
            path,
            std::io::Error::other("output path is a directory, needs a file name"),
        ));
    }

    let parent = parent_dir(path);
    if !parent.is_dir() {
        return Err(ExtractionError::io(
            path,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("directory {} does not exist", parent.display()),
            ),
        ));
    }

    Ok(())
}

pub fn render(records: &[OutputRecord], format: OutputFormat) -> ExtractionResult<Vec<u8>> {
    let mut buf = Vec::new();

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut buf, records)?;
            buf.push(b'\n');
        }
        OutputFormat::JsonLines => {
            for record in records {
                serde_json::to_writer(&mut buf, record)?;
                buf.push(b'\n');
            }
        }
    }

    Ok(buf)
}

/// Replace `path` with the serialized records.
///
/// The data is written to a temporary file next to the destination and renamed over it, so
/// readers see either the previous contents or the complete new file.
pub fn write_records(
    path: &Path,
    records: &[OutputRecord],
    format: OutputFormat,
) -> ExtractionResult<()> {
    check_destination(path)?;
    let data = render(records, format)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".ldap-extract")
        .tempfile_in(parent_dir(path))
        .map_err(|e| ExtractionError::io(path, e))?;

    tmp.write_all(&data)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ExtractionError::io(path, e))?;

    tmp.persist(path)
        .map_err(|e| ExtractionError::io(path, e.error))?;

    debug!(path = %path.display(), bytes = data.len(), "Output written");
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(cn: &str) -> OutputRecord {
        let mut record = OutputRecord::new();
        record.insert("cn", json!([cn]));
        record.insert("source", json!("hr-sync"));
        record
    }

    #[test]
    fn test_default_output_path() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap();
        assert_eq!(
            default_output_path("corp", OutputFormat::Json, now),
            PathBuf::from("2026-10-16T083000Z-corp_ad.json")
        );
    }

    #[test]
    fn test_empty_json_is_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        write_records(&path, &[], OutputFormat::Json).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, json!([]));
    }

    #[test]
    fn test_write_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "old contents that are much longer than the new ones").unwrap();

        let records = vec![record("Jane Doe")];
        write_records(&path, &records, OutputFormat::Json).unwrap();

        let parsed: Vec<OutputRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let records = vec![record("Jane Doe"), record("John Roe")];

        write_records(&path, &records, OutputFormat::JsonLines).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<OutputRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_directory_destination_is_io_error() {
        let dir = tempfile::tempdir().unwrap();

        let err = write_records(dir.path(), &[], OutputFormat::Json).unwrap_err();
        assert!(matches!(err, ExtractionError::Io { .. }));
    }

    #[test]
    fn test_missing_parent_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.json");

        assert!(matches!(
            check_destination(&path),
            Err(ExtractionError::Io { .. })
        ));
    }
}
