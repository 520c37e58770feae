// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! CSV and HTML renderings of a record set.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local};
use tokio::fs;
use tracing::info;

use crate::record::LogRecord;

const COLUMNS: [&str; 7] = [
    "Timestamp",
    "Route",
    "Method",
    "StatusCode",
    "Duration",
    "StaffId",
    "CompanyId",
];
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ExportError {
    #[error("failed to write export {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Html,
}

impl ExportFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Html => "html",
        }
    }

    #[must_use]
    pub fn render(self, records: &[LogRecord]) -> String {
        match self {
            ExportFormat::Csv => render_csv(records),
            ExportFormat::Html => render_html(records),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "html" => Ok(ExportFormat::Html),
            _ => Err(format!(
                "Invalid export format: '{s}'. Valid formats are: csv, html"
            )),
        }
    }
}

fn row(record: &LogRecord) -> [String; 7] {
    [
        record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        record.route.clone(),
        record.method.clone(),
        record.status_code.to_string(),
        record.duration.to_string(),
        record.staff_id.clone(),
        record.company_id.clone(),
    ]
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[must_use]
pub fn render_csv(records: &[LogRecord]) -> String {
    let mut out = COLUMNS.join(",");
    out.push('\n');
    for record in records {
        let fields: Vec<String> = row(record).iter().map(|f| csv_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

#[must_use]
pub fn render_html(records: &[LogRecord]) -> String {
    let mut out = String::from(
        "<html><head><meta charset='UTF-8'><style>\
         table{border-collapse:collapse;width:100%;}\
         th,td{border:1px solid #ccc;padding:8px;text-align:left;}\
         th{background:#f4f4f4;}\
         </style></head><body>\n<h2>Request Log Analysis Report</h2>\n<table><thead><tr>",
    );
    for column in COLUMNS {
        out.push_str(&format!("<th>{column}</th>"));
    }
    out.push_str("</tr></thead><tbody>\n");
    for record in records {
        out.push_str("<tr>");
        for field in row(record) {
            out.push_str(&format!("<td>{}</td>", html_escape(&field)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody></table></body></html>\n");
    out
}

/// `{dir}/analysis_{yyyyMMdd_HHmmss}.{ext}`
#[must_use]
pub fn export_path(dir: &Path, format: ExportFormat, now: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "analysis_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

/// Writes `records` to `path` in `format`.
///
/// # Errors
///
/// Returns `ExportError::Io` when the file cannot be written.
pub async fn export_to(
    records: &[LogRecord],
    format: ExportFormat,
    path: &Path,
) -> Result<(), ExportError> {
    fs::write(path, format.render(records))
        .await
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Renders `records` into a fresh timestamped file under `dir`, creating it if needed.
///
/// # Errors
///
/// Returns `ExportError::Io` when the directory or file cannot be written.
pub async fn export(
    records: &[LogRecord],
    format: ExportFormat,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)
        .await
        .map_err(|source| ExportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    let path = export_path(dir, format, Local::now());
    export_to(records, format, &path).await?;
    info!(path = %path.display(), count = records.len(), "Export written");
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample() -> LogRecord {
        LogRecord {
            timestamp: Local.with_ymd_and_hms(2025, 4, 17, 9, 5, 7).unwrap(),
            route: "/search".to_string(),
            method: "GET".to_string(),
            status_code: 200,
            duration: 42,
            staff_id: "S1".to_string(),
            ..LogRecord::default()
        }
    }

    #[test]
    fn test_csv_layout() {
        let csv = render_csv(&[sample()]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Timestamp,Route,Method,StatusCode,Duration,StaffId,CompanyId"
        );
        assert_eq!(lines[1], "2025-04-17 09:05:07,/search,GET,200,42,S1,-");
    }

    #[test]
    fn test_csv_quotes_special_fields() {
        let record = LogRecord {
            route: "/a,b".to_string(),
            company_id: "say \"hi\"".to_string(),
            ..sample()
        };
        let csv = render_csv(&[record]);
        assert!(csv.contains(",\"/a,b\","));
        assert!(csv.contains(",\"say \"\"hi\"\"\"\n"));
    }

    #[test]
    fn test_html_escapes_cells() {
        let record = LogRecord {
            route: "/<script>".to_string(),
            ..sample()
        };
        let html = render_html(&[record]);
        assert!(html.contains("<td>/&lt;script&gt;</td>"));
        assert!(html.contains("<th>StatusCode</th>"));
        assert!(!html.contains("/<script>"));
    }

    #[test]
    fn test_html_has_header_and_one_row_per_record() {
        let html = render_html(&[sample(), sample()]);
        assert_eq!(html.matches("<th>").count(), COLUMNS.len());
        assert_eq!(html.matches("<tr><td>").count(), 2);
        assert_eq!(html.matches("<td>").count(), 2 * COLUMNS.len());
        assert!(html.ends_with("</tbody></table></body></html>\n"));
    }

    #[test]
    fn test_export_path() {
        let now = Local.with_ymd_and_hms(2025, 4, 17, 9, 5, 7).unwrap();
        assert_eq!(
            export_path(Path::new("exports"), ExportFormat::Html, now),
            PathBuf::from("exports/analysis_20250417_090507.html")
        );
    }

    #[tokio::test]
    async fn test_export_creates_directory() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("exports");
        let path = export(&[sample()], ExportFormat::Csv, &target).await.unwrap();

        assert!(path.starts_with(&target));
        assert_eq!(path.extension().unwrap(), "csv");
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written.lines().count(), 2);
    }
}
