use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::models::{PublishRecord, ScrapedEvent};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("`{0}` already exists")]
    AlreadyExists(PathBuf),
    #[error("failed to write `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize dump: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn snapshot_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}-events.json", now.format("%Y-%m-%dT%H-%M-%S")))
}

pub fn records_path(dir: &Path, now: DateTime<Utc>) -> PathBuf {
    dir.join(format!("{}-records.ndjson", now.format("%Y-%m-%dT%H-%M-%S")))
}

/// Writes the scraped events of one run as a JSON array.
pub fn write_snapshot(
    dir: &Path,
    events: &[ScrapedEvent],
    now: DateTime<Utc>,
) -> Result<PathBuf, DumpError> {
    let path = snapshot_path(dir, now);
    let mut writer = create_new(&path)?;
    serde_json::to_writer_pretty(&mut writer, events)?;
    finish(&path, writer)?;
    info!("Saved {} events to `{}`", events.len(), path.display());
    Ok(path)
}

/// Writes publish records as newline-delimited JSON, one record per line.
pub fn write_records_ndjson(
    dir: &Path,
    records: &[PublishRecord],
    now: DateTime<Utc>,
) -> Result<PathBuf, DumpError> {
    let path = records_path(dir, now);
    let mut writer = create_new(&path)?;
    write_lines(&path, &mut writer, records)?;
    finish(&path, writer)?;
    info!("Saved {} records to `{}`", records.len(), path.display());
    Ok(path)
}

fn write_lines<T: Serialize>(
    path: &Path,
    writer: &mut BufWriter<fs::File>,
    items: &[T],
) -> Result<(), DumpError> {
    for item in items {
        serde_json::to_writer(&mut *writer, item)?;
        writer.write_all(b"\n").map_err(|source| DumpError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn create_new(path: &Path) -> Result<BufWriter<fs::File>, DumpError> {
    let io_err = |source| DumpError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(io_err)?;
            info!("Created folder `{}`", parent.display());
        }
    }
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| match source.kind() {
            io::ErrorKind::AlreadyExists => DumpError::AlreadyExists(path.to_path_buf()),
            _ => io_err(source),
        })?;
    Ok(BufWriter::new(file))
}

fn finish(path: &Path, mut writer: BufWriter<fs::File>) -> Result<(), DumpError> {
    writer.flush().map_err(|source| DumpError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 5).unwrap()
    }

    fn event() -> ScrapedEvent {
        ScrapedEvent {
            source_url: "https://swingrevolution.pl/wydarzenia/practice-chill/".to_string(),
            title: "Practice & Chill".to_string(),
            description: String::new(),
            place_name: "Studio".to_string(),
            place_address: "Łąkowa 35/38".to_string(),
            image_url: None,
            occurrences: Vec::new(),
        }
    }

    #[test]
    fn snapshot_is_a_json_array_named_by_run_time() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let path = write_snapshot(&out, &[event(), event()], now()).unwrap();
        assert_eq!(path, out.join("2024-07-01T09-30-05-events.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let array = value.as_array().expect("json array");
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["title"], "Practice & Chill");
    }

    #[test]
    fn existing_snapshot_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        write_snapshot(dir.path(), &[event()], now()).unwrap();
        let err = write_snapshot(dir.path(), &[], now()).unwrap_err();
        assert!(matches!(err, DumpError::AlreadyExists(_)));

        let kept = fs::read_to_string(snapshot_path(dir.path(), now())).unwrap();
        assert!(kept.contains("Practice & Chill"));
    }

    #[test]
    fn records_are_one_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let record = PublishRecord {
            title: "Practice & Chill".to_string(),
            description: String::new(),
            place_name: "Studio".to_string(),
            place_address: "Łąkowa 35/38".to_string(),
            online_locations: vec![],
            start_datetime: 1722074400,
            end_datetime: None,
            multidate: true,
            tags: vec!["swing".to_string()],
            image: Some(vec![0; 7]),
        };
        let path = write_records_ndjson(dir.path(), &[record.clone(), record], now()).unwrap();
        let contents = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["image_bytes"], 7);
        assert_eq!(first["start_datetime"], 1722074400);
    }
}
