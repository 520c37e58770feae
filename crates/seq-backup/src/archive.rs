// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Archive files in the backup directory.
//!
//! Every fetch produces one `logs_{yyyy-MM-dd_HH-mm-ss}.json` file holding a
//! JSON array of raw events. The array is streamed: [`ArchiveWriter`] opens
//! it, appends pages as they arrive and closes it on [`ArchiveWriter::finish`].
//! A process killed mid-fetch leaves the closing bracket off, which
//! [`load_archive`] repairs on read.
//!
//! Listing helpers treat a missing or unreadable directory as empty.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, NaiveDate};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::record::{map_events, LogRecord, RawEvent};

pub const ARCHIVE_PREFIX: &str = "logs_";
pub const ARCHIVE_EXTENSION: &str = "json";
/// Older plain-text exports, read by the whole-folder analysis only.
pub const TEXT_ARCHIVE_EXTENSION: &str = "txt";
const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ArchiveError {
    #[error("archive I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid archive {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ArchiveError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
        move |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Incremental writer for one archive file.
pub struct ArchiveWriter {
    file: BufWriter<File>,
    path: PathBuf,
    written: usize,
}

impl ArchiveWriter {
    /// Creates the backup directory if needed and opens a fresh archive named after `now`.
    ///
    /// An existing file is never overwritten: a numeric suffix is appended
    /// until the name is free.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveError::Io` if the directory or file cannot be created.
    pub async fn create(dir: &Path, now: DateTime<Local>) -> Result<Self, ArchiveError> {
        fs::create_dir_all(dir).await.map_err(ArchiveError::io(dir))?;

        let stem = format!(
            "{ARCHIVE_PREFIX}{}",
            now.format(ARCHIVE_TIMESTAMP_FORMAT)
        );
        let mut suffix = 0u32;
        let (file, path) = loop {
            let name = if suffix == 0 {
                format!("{stem}.{ARCHIVE_EXTENSION}")
            } else {
                format!("{stem}_{suffix}.{ARCHIVE_EXTENSION}")
            };
            let path = dir.join(name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (file, path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(ArchiveError::io(&path)(e)),
            }
        };

        let mut writer = ArchiveWriter {
            file: BufWriter::new(file),
            path,
            written: 0,
        };
        writer.write(b"[").await?;
        debug!(path = %writer.path.display(), "Archive opened");
        Ok(writer)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ArchiveError> {
        self.file
            .write_all(bytes)
            .await
            .map_err(ArchiveError::io(&self.path))
    }

    /// Appends events in order and flushes them to disk.
    ///
    /// # Errors
    ///
    /// Fails on serialization or I/O errors.
    pub async fn append(&mut self, events: &[RawEvent]) -> Result<(), ArchiveError> {
        for event in events {
            let encoded = serde_json::to_vec(event)?;
            let separator: &[u8] = if self.written == 0 { b"\n" } else { b",\n" };
            self.write(separator).await?;
            self.write(&encoded).await?;
            self.written += 1;
        }
        self.file
            .flush()
            .await
            .map_err(ArchiveError::io(&self.path))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Closes the JSON array. Returns the file path and number of events written.
    ///
    /// # Errors
    ///
    /// Fails if the closing bracket cannot be written.
    pub async fn finish(mut self) -> Result<(PathBuf, usize), ArchiveError> {
        self.write(b"\n]\n").await?;
        self.file
            .flush()
            .await
            .map_err(ArchiveError::io(&self.path))?;
        Ok((self.path, self.written))
    }
}

/// Reads an archive. An unterminated array is closed once before giving up.
///
/// # Errors
///
/// `Io` when the file cannot be read, `Parse` when it is not a JSON array
/// even after repair.
pub async fn load_archive(path: &Path) -> Result<Vec<RawEvent>, ArchiveError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(ArchiveError::io(path))?;

    match serde_json::from_str::<Vec<RawEvent>>(&text) {
        Ok(events) => Ok(events),
        Err(source) => {
            let trimmed = text.trim_end();
            if trimmed.starts_with('[') && !trimmed.ends_with(']') {
                let repaired = format!("{trimmed}\n]");
                if let Ok(events) = serde_json::from_str::<Vec<RawEvent>>(&repaired) {
                    warn!(path = %path.display(), count = events.len(), "Repaired unterminated archive");
                    return Ok(events);
                }
            }
            Err(ArchiveError::Parse {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

/// Loads and maps several archives. Unreadable files are skipped.
pub async fn load_records(paths: &[PathBuf]) -> Vec<LogRecord> {
    let mut records = Vec::new();
    for path in paths {
        match load_archive(path).await {
            Ok(events) => records.extend(map_events(&events)),
            Err(e) => warn!("Skipping archive: {e}"),
        }
    }
    records
}

async fn archive_files(dir: &Path, extensions: &[&str]) -> Vec<(PathBuf, SystemTime)> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), "Cannot list backup directory: {e}");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                let matches = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| extensions.contains(&ext));
                if !matches {
                    continue;
                }
                let Ok(metadata) = entry.metadata().await else {
                    continue;
                };
                if !metadata.is_file() {
                    continue;
                }
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((path, modified));
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), "Error while listing backup directory: {e}");
                break;
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

/// The most recently modified `*.json` file in `dir`, whatever its name.
pub async fn latest_archive(dir: &Path) -> Option<PathBuf> {
    archive_files(dir, &[ARCHIVE_EXTENSION])
        .await
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
        .map(|(path, _)| path)
}

/// Every `*.json` and `*.txt` file in `dir`, sorted by name.
pub async fn all_archives(dir: &Path) -> Vec<PathBuf> {
    archive_files(dir, &[ARCHIVE_EXTENSION, TEXT_ARCHIVE_EXTENSION])
        .await
        .into_iter()
        .map(|(path, _)| path)
        .collect()
}

/// Calendar grouping for historical analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl GroupBy {
    /// Period key of `date`: `2025-04-17`, `2025/W16`, `2025-04` or `2025`.
    #[must_use]
    pub fn key(self, date: NaiveDate) -> String {
        match self {
            GroupBy::Day => date.format("%Y-%m-%d").to_string(),
            GroupBy::Month => date.format("%Y-%m").to_string(),
            GroupBy::Year => date.format("%Y").to_string(),
            GroupBy::Week => {
                let week = date.iso_week();
                format!("{}/W{:02}", week.year(), week.week())
            }
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupBy::Day => "day",
            GroupBy::Week => "week",
            GroupBy::Month => "month",
            GroupBy::Year => "year",
        };
        f.write_str(name)
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "d" => Ok(GroupBy::Day),
            "week" | "w" => Ok(GroupBy::Week),
            "month" | "m" => Ok(GroupBy::Month),
            "year" | "y" => Ok(GroupBy::Year),
            _ => Err(format!(
                "Invalid grouping: '{s}'. Valid groupings are: day, week, month, year"
            )),
        }
    }
}

/// Date embedded in an archive file name, if it follows the `logs_{yyyy-MM-dd}…` pattern.
#[must_use]
pub fn archive_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(ARCHIVE_PREFIX)?;
    if !name.ends_with(".json") {
        return None;
    }
    let date = rest.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Distinct period keys of the archives in `dir`, sorted ascending.
pub async fn available_periods(dir: &Path, group: GroupBy) -> Vec<String> {
    let mut keys: Vec<String> = all_archives(dir)
        .await
        .iter()
        .filter_map(|path| archive_date(path))
        .map(|date| group.key(date))
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

/// Archives whose embedded date falls in the period `key`.
pub async fn files_for_period(dir: &Path, group: GroupBy, key: &str) -> Vec<PathBuf> {
    all_archives(dir)
        .await
        .into_iter()
        .filter(|path| archive_date(path).is_some_and(|date| group.key(date) == key))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 17, h, m, s).unwrap()
    }

    #[tokio::test]
    async fn test_writer_produces_json_array() {
        let dir = TempDir::new().unwrap();
        let backups = dir.path().join("Backups");

        let mut writer = ArchiveWriter::create(&backups, at(10, 0, 0)).await.unwrap();
        writer
            .append(&[json!({"Id": "a"}), json!({"Id": "b"})])
            .await
            .unwrap();
        writer.append(&[json!({"Id": "c"})]).await.unwrap();
        let (path, total) = writer.finish().await.unwrap();

        assert_eq!(total, 3);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "logs_2025-04-17_10-00-00.json"
        );
        let events = load_archive(&path).await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e["Id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_archive_is_valid() {
        let dir = TempDir::new().unwrap();
        let writer = ArchiveWriter::create(dir.path(), at(10, 0, 0)).await.unwrap();
        let (path, total) = writer.finish().await.unwrap();
        assert_eq!(total, 0);
        assert!(load_archive(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_name_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let first = ArchiveWriter::create(dir.path(), at(10, 0, 0)).await.unwrap();
        let second = ArchiveWriter::create(dir.path(), at(10, 0, 0)).await.unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(
            second.path().file_name().unwrap().to_str().unwrap(),
            "logs_2025-04-17_10-00-00_1.json"
        );
    }

    #[tokio::test]
    async fn test_unterminated_archive_is_repaired() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs_2025-04-17_10-00-00.json");
        std::fs::write(&path, "[\n{\"Id\":\"a\"},\n{\"Id\":\"b\"}").unwrap();

        let events = load_archive(&path).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_truncated_event_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs_2025-04-17_10-00-00.json");
        std::fs::write(&path, "[\n{\"Id\":\"a\"},\n{\"Id\":").unwrap();

        let err = load_archive(&path).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_load_records_skips_bad_files() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("logs_2025-04-17_10-00-00.json");
        let bad = dir.path().join("logs_2025-04-17_11-00-00.json");
        std::fs::write(
            &good,
            r#"[{"Id":"a","Properties":[{"Name":"Route","Value":"/a"}]}, "noise"]"#,
        )
        .unwrap();
        std::fs::write(&bad, "not json").unwrap();

        let records = load_records(&[good, bad, dir.path().join("missing.json")]).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].route, "/a");
    }

    #[tokio::test]
    async fn test_latest_archive_by_modification_time() {
        let dir = TempDir::new().unwrap();
        assert!(latest_archive(dir.path()).await.is_none());

        let old = dir.path().join("logs_2025-04-17_12-00-00.json");
        let new = dir.path().join("manual.json");
        std::fs::write(&old, "[]").unwrap();
        std::fs::write(&new, "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let past = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        assert_eq!(latest_archive(dir.path()).await, Some(new));
    }

    #[tokio::test]
    async fn test_all_archives_include_text_exports() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("logs_2025-04-17_12-00-00.json");
        let text = dir.path().join("old_export.txt");
        std::fs::write(&json, r#"[{"Id":"a","Properties":[]}]"#).unwrap();
        std::fs::write(&text, r#"[{"Id":"b","Properties":[]},{"Id":"c","Properties":[]}]"#)
            .unwrap();
        std::fs::write(dir.path().join("report.csv"), "x").unwrap();

        let files = all_archives(dir.path()).await;
        assert_eq!(files, vec![json.clone(), text]);
        assert_eq!(load_records(&files).await.len(), 3);

        // delivery and period lookups stay on the JSON archives
        assert_eq!(latest_archive(dir.path()).await, Some(json.clone()));
        assert_eq!(
            files_for_period(dir.path(), GroupBy::Day, "2025-04-17").await,
            vec![json]
        );
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(latest_archive(&missing).await.is_none());
        assert!(all_archives(&missing).await.is_empty());
        assert!(available_periods(&missing, GroupBy::Day).await.is_empty());
    }

    #[tokio::test]
    async fn test_periods_and_files_per_grouping() {
        let dir = TempDir::new().unwrap();
        for name in [
            "logs_2024-12-30_08-00-00.json",
            "logs_2025-01-02_09-00-00.json",
            "logs_2025-01-02_10-00-00_1.json",
            "logs_2025-02-14_10-00-00.json",
            "analysis.json",
        ] {
            std::fs::write(dir.path().join(name), "[]").unwrap();
        }

        assert_eq!(
            available_periods(dir.path(), GroupBy::Day).await,
            vec!["2024-12-30", "2025-01-02", "2025-02-14"]
        );
        assert_eq!(
            available_periods(dir.path(), GroupBy::Month).await,
            vec!["2024-12", "2025-01", "2025-02"]
        );
        assert_eq!(
            available_periods(dir.path(), GroupBy::Year).await,
            vec!["2024", "2025"]
        );
        // 2024-12-30 and 2025-01-02 share ISO week 1 of 2025
        assert_eq!(
            available_periods(dir.path(), GroupBy::Week).await,
            vec!["2025/W01", "2025/W07"]
        );

        assert_eq!(
            files_for_period(dir.path(), GroupBy::Week, "2025/W01").await.len(),
            3
        );
        assert_eq!(
            files_for_period(dir.path(), GroupBy::Day, "2025-01-02").await.len(),
            2
        );
        assert_eq!(
            files_for_period(dir.path(), GroupBy::Year, "2024").await.len(),
            1
        );
        assert_eq!(all_archives(dir.path()).await.len(), 5);
    }

    #[test]
    fn test_group_by_from_str() {
        assert_eq!("Week".parse::<GroupBy>().unwrap(), GroupBy::Week);
        assert_eq!("m".parse::<GroupBy>().unwrap(), GroupBy::Month);
        assert!("quarter".parse::<GroupBy>().is_err());
    }
}
