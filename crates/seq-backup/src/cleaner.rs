// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retention cleanup of archives and exports.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, info, warn};

const CLEANED_EXTENSIONS: [&str; 3] = ["json", "csv", "html"];

/// Deletes `*.json`, `*.csv` and `*.html` files in `dir` last modified more
/// than `days` days ago. Returns how many were removed.
pub async fn cleanup_old_files(dir: &Path, days: u64) -> usize {
    let max_age = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), "Cannot clean directory: {e}");
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), "Error while listing directory: {e}");
                break;
            }
        };
        let path = entry.path();
        let cleaned = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| CLEANED_EXTENSIONS.contains(&ext));
        if !cleaned {
            continue;
        }

        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if !metadata.is_file() || modified >= cutoff {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Removed old file");
                removed += 1;
            }
            Err(e) => warn!(path = %path.display(), "Failed to delete file: {e}"),
        }
    }

    info!(dir = %dir.display(), removed, days, "Cleanup finished");
    removed
}
