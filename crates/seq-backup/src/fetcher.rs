// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Paginated retrieval of events from the Seq `/api/events` endpoint.
//!
//! Pages are requested one at a time through [`Pages::next_page`], each
//! carrying the id of the last event received as its `afterId` cursor.
//! [`Fetcher::fetch`] streams every page into a fresh archive file before
//! asking for the next one, so memory use is bounded by the page size.
//!
//! Pagination stops on the first of:
//! - an empty page,
//! - a page shorter than `PageSize`,
//! - a page whose last event carries no id,
//! - a failed request, which marks the fetch as [`FetchStatus::Aborted`].
//!
//! Failed requests are not retried here.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Local, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn, Instrument};

use crate::archive::{ArchiveError, ArchiveWriter};
use crate::config::Config;
use crate::http::get_client;
use crate::record::RawEvent;

pub const API_KEY_HEADER: &str = "X-Seq-ApiKey";
const EVENTS_PATH: &str = "/api/events";

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum FetchError {
    #[error("Seq returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request to Seq failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid page body: {0}")]
    Decode(reqwest::Error),
}

/// Half-open `[start, end)` query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeWindow { start, end }
    }

    /// Window relative to `now`, offsets in signed minutes. `None` when an
    /// offset falls outside the representable date range.
    #[must_use]
    pub fn from_offsets(
        now: DateTime<Utc>,
        start_minutes: i64,
        end_minutes: i64,
    ) -> Option<Self> {
        let shift = |minutes| {
            Duration::try_minutes(minutes).and_then(|delta| now.checked_add_signed(delta))
        };
        Some(TimeWindow {
            start: shift(start_minutes)?,
            end: shift(end_minutes)?,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Named windows offered by the on-demand fetch. Days are UTC days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Today,
    Yesterday,
    LastHour,
    Last6Hours,
    Last12Hours,
}

impl Preset {
    #[must_use]
    pub fn window(self, now: DateTime<Utc>) -> TimeWindow {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or(now, |naive| naive.and_utc());
        match self {
            Preset::Today => TimeWindow::new(midnight, midnight + Duration::days(1)),
            Preset::Yesterday => TimeWindow::new(midnight - Duration::days(1), midnight),
            Preset::LastHour => TimeWindow::new(now - Duration::hours(1), now),
            Preset::Last6Hours => TimeWindow::new(now - Duration::hours(6), now),
            Preset::Last12Hours => TimeWindow::new(now - Duration::hours(12), now),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(Preset::Today),
            "yesterday" => Ok(Preset::Yesterday),
            "last-hour" | "1h" => Ok(Preset::LastHour),
            "last-6-hours" | "6h" => Ok(Preset::Last6Hours),
            "last-12-hours" | "12h" => Ok(Preset::Last12Hours),
            _ => Err(format!(
                "Invalid preset: '{s}'. Valid presets are: today, yesterday, last-hour, last-6-hours, last-12-hours"
            )),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

#[derive(Debug)]
pub enum FetchStatus {
    Complete,
    Aborted(FetchError),
}

impl FetchStatus {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, FetchStatus::Complete)
    }
}

/// Outcome of one [`Fetcher::fetch`]. The archive at `path` is always a closed JSON array.
#[derive(Debug)]
pub struct FetchSummary {
    pub path: PathBuf,
    pub total: usize,
    pub status: FetchStatus,
}

/// Seq filter expression selecting one application's request logs.
#[must_use]
pub fn build_filter(application_name: &str, log_type: &str) -> String {
    format!(
        "Application = '{}' and @Level = 'Information' and LogType = '{}'",
        application_name.replace('\'', "''"),
        log_type.replace('\'', "''")
    )
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    filter: String,
    page_size: u32,
    backup_directory: PathBuf,
}

impl Fetcher {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_client(get_client(config), config)
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &Config) -> Self {
        Fetcher {
            client,
            base_url: config.base_url().to_string(),
            api_key: config.api_key.trim().to_string(),
            filter: build_filter(&config.application_name, &config.log_type),
            page_size: config.page_size.max(1),
            backup_directory: config.backup_directory.clone(),
        }
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    #[must_use]
    pub fn pages(&self, window: TimeWindow) -> Pages<'_> {
        Pages {
            fetcher: self,
            window,
            cursor: None,
            requests: 0,
            done: false,
        }
    }

    async fn request_page(
        &self,
        window: &TimeWindow,
        cursor: Option<&str>,
    ) -> Result<Vec<RawEvent>, FetchError> {
        let url = format!("{}{EVENTS_PATH}", self.base_url);
        let mut request = self.client.get(url).query(&[
            ("count", self.page_size.to_string()),
            ("start", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("filter", self.filter.clone()),
        ]);
        if let Some(cursor) = cursor {
            request = request.query(&[("afterId", cursor)]);
        }
        if !self.api_key.is_empty() {
            request = request.header(API_KEY_HEADER, &self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<Vec<RawEvent>>()
            .await
            .map_err(FetchError::Decode)
    }

    /// Fetches every page of `window` into a new archive file.
    ///
    /// Transport failures end the fetch early and are reported through
    /// [`FetchSummary::status`]; the events received so far stay in the archive.
    ///
    /// # Errors
    ///
    /// Only local I/O failures on the archive file are returned as `Err`.
    pub async fn fetch(&self, window: &TimeWindow) -> Result<FetchSummary, ArchiveError> {
        let span = tracing::info_span!("fetch", window = %window);
        self.fetch_inner(window).instrument(span).await
    }

    async fn fetch_inner(&self, window: &TimeWindow) -> Result<FetchSummary, ArchiveError> {
        let mut writer = ArchiveWriter::create(&self.backup_directory, Local::now()).await?;
        let mut pages = self.pages(*window);

        let status = loop {
            match pages.next_page().await {
                Ok(Some(events)) => {
                    writer.append(&events).await?;
                    debug!(
                        page = pages.requests(),
                        count = events.len(),
                        total = writer.written(),
                        "Page archived"
                    );
                }
                Ok(None) => break FetchStatus::Complete,
                Err(e) => {
                    error!(
                        page = pages.requests(),
                        total = writer.written(),
                        "Fetch aborted: {e}"
                    );
                    break FetchStatus::Aborted(e);
                }
            }
        };

        let (path, total) = writer.finish().await?;
        info!(
            total,
            requests = pages.requests(),
            path = %path.display(),
            "Fetch finished"
        );
        Ok(FetchSummary {
            path,
            total,
            status,
        })
    }
}

/// Lazy cursor-driven sequence of pages for one window.
pub struct Pages<'a> {
    fetcher: &'a Fetcher,
    window: TimeWindow,
    cursor: Option<String>,
    requests: usize,
    done: bool,
}

impl Pages<'_> {
    /// Requests the next page. `Ok(None)` once the window is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the transport or status failure of the request; no further
    /// pages are produced afterwards.
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawEvent>>, FetchError> {
        if self.done {
            return Ok(None);
        }

        self.requests += 1;
        let events = match self
            .fetcher
            .request_page(&self.window, self.cursor.as_deref())
            .await
        {
            Ok(events) => events,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };

        if events.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let page_size = self.fetcher.page_size as usize;
        if events.len() < page_size {
            self.done = true;
        }

        match events.last().and_then(|e| e.get("Id")).and_then(Value::as_str) {
            Some(id) => self.cursor = Some(id.to_string()),
            None => {
                if !self.done {
                    warn!("Last event of page has no Id, stopping pagination");
                }
                self.done = true;
            }
        }

        Ok(Some(events))
    }

    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Number of requests issued so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests
    }
}
