// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Recurring fetch-and-deliver loop.
//!
//! [`Scheduler::start`] spawns the loop and hands back a [`SchedulerHandle`]
//! owning its cancellation token. Each cycle fetches the configured window
//! relative to now, then (when the webhook is enabled) delivers the most
//! recently modified archive in the backup directory. That is not
//! necessarily the file the cycle just wrote: a manual fetch running
//! alongside may have produced a newer one.
//!
//! Cancellation is cooperative. It is observed before each cycle, during
//! webhook retry sleeps and during the sleep between cycles; a fetch in
//! flight runs to completion.

use core::time::Duration;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::archive::{latest_archive, load_archive};
use crate::config::{Config, SchedulerConfig};
use crate::fetcher::{FetchSummary, Fetcher, TimeWindow};
use crate::record::map_events;
use crate::webhook::{deliver_with_retry, RetryPolicy, WebhookDispatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Webhook sending is switched off or has no URL.
    Disabled,
    /// The backup directory holds no archive.
    NoArchive,
    Delivered { path: PathBuf, records: usize },
    Failed { path: PathBuf, records: usize },
}

#[derive(Debug)]
pub struct CycleReport {
    pub window: TimeWindow,
    /// `None` when the archive could not be written.
    pub fetch: Option<FetchSummary>,
    pub delivery: DeliveryOutcome,
}

/// Loads the newest archive in `dir` and delivers its records under `policy`.
pub async fn deliver_latest_archive(
    dir: &Path,
    dispatcher: &WebhookDispatcher,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> DeliveryOutcome {
    if !dispatcher.is_enabled() {
        debug!("Webhook disabled, skipping delivery");
        return DeliveryOutcome::Disabled;
    }

    let Some(path) = latest_archive(dir).await else {
        warn!(dir = %dir.display(), "No archive found to deliver");
        return DeliveryOutcome::NoArchive;
    };

    let events = match load_archive(&path).await {
        Ok(events) => events,
        Err(e) => {
            warn!("Cannot deliver latest archive: {e}");
            return DeliveryOutcome::Failed { path, records: 0 };
        }
    };
    let records = map_events(&events);
    info!(path = %path.display(), records = records.len(), "Delivering latest archive");

    if deliver_with_retry(dispatcher, &records, policy, cancel).await {
        DeliveryOutcome::Delivered {
            path,
            records: records.len(),
        }
    } else {
        DeliveryOutcome::Failed {
            path,
            records: records.len(),
        }
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    interval: Duration,
    backup_directory: PathBuf,
    fetcher: Fetcher,
    dispatcher: WebhookDispatcher,
    policy: RetryPolicy,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_parts(config, Fetcher::new(config), WebhookDispatcher::new(config))
    }

    #[must_use]
    pub fn with_parts(config: &Config, fetcher: Fetcher, dispatcher: WebhookDispatcher) -> Self {
        Scheduler {
            config: config.scheduler.clone(),
            interval: Duration::from_secs(config.scheduler.interval_minutes.saturating_mul(60)),
            backup_directory: config.backup_directory.clone(),
            fetcher,
            dispatcher,
            policy: RetryPolicy::from(&config.webhook),
        }
    }

    /// Overrides the pause between cycles.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One fetch-and-deliver cycle for the window ending relative to now.
    /// `None` when the configured offsets put the window out of range; the
    /// cycle is then skipped.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<CycleReport> {
        let Some(window) = TimeWindow::from_offsets(
            Utc::now(),
            self.config.query_start_offset_minutes,
            self.config.query_end_offset_minutes,
        ) else {
            error!(
                start_offset = self.config.query_start_offset_minutes,
                end_offset = self.config.query_end_offset_minutes,
                "Scheduled window is out of range, skipping cycle"
            );
            return None;
        };
        info!(%window, "Starting scheduled fetch");

        let fetch = match self.fetcher.fetch(&window).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!("Scheduled fetch failed: {e}");
                None
            }
        };

        let delivery =
            deliver_latest_archive(&self.backup_directory, &self.dispatcher, &self.policy, cancel)
                .await;

        Some(CycleReport {
            window,
            fetch,
            delivery,
        })
    }

    /// Spawns the loop. When scheduling is disabled nothing is spawned and
    /// the returned handle is already stopped.
    #[must_use]
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();

        if !self.config.enabled {
            info!("Scheduler disabled in configuration, not starting");
            return SchedulerHandle {
                status: Arc::new(RwLock::new(SchedulerStatus::Stopped)),
                cancel,
                task: None,
            };
        }

        let status = Arc::new(RwLock::new(SchedulerStatus::Idle));
        let task = tokio::spawn(
            self.run(cancel.clone(), Arc::clone(&status))
                .instrument(tracing::info_span!("scheduler")),
        );

        SchedulerHandle {
            status,
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken, status: Arc<RwLock<SchedulerStatus>>) {
        {
            let mut status = status.write().await;
            if *status == SchedulerStatus::Idle {
                *status = SchedulerStatus::Running;
            }
        }
        info!(
            interval_secs = self.interval.as_secs(),
            start_offset = self.config.query_start_offset_minutes,
            end_offset = self.config.query_end_offset_minutes,
            "Scheduler started"
        );

        let mut cycle = 0u64;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            cycle += 1;
            match self.run_cycle(&cancel).await {
                Some(report) => debug!(
                    cycle,
                    fetched = report.fetch.as_ref().map_or(0, |f| f.total),
                    delivery = ?report.delivery,
                    "Cycle finished"
                ),
                None => debug!(cycle, "Cycle skipped"),
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        *status.write().await = SchedulerStatus::Stopped;
        info!(cycles = cycle, "Scheduler stopped");
    }
}

/// Owner of a running scheduler loop.
#[derive(Debug)]
pub struct SchedulerHandle {
    status: Arc<RwLock<SchedulerStatus>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Requests the loop to stop. Idempotent.
    pub async fn stop(&self) {
        let mut status = self.status.write().await;
        if matches!(*status, SchedulerStatus::Stopped | SchedulerStatus::Stopping) {
            return;
        }
        *status = SchedulerStatus::Stopping;
        drop(status);

        debug!("Stopping scheduler");
        self.cancel.cancel();
    }

    pub async fn status(&self) -> SchedulerStatus {
        *self.status.read().await
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.status.read().await, SchedulerStatus::Running)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the loop to exit.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Scheduler task failed: {e}");
                *self.status.write().await = SchedulerStatus::Stopped;
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}
