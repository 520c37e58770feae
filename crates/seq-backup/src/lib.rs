// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scheduled extraction, archival and analysis of Seq request logs.
//!
//! The crate implements a retrieval, normalization, analysis and delivery
//! pipeline for request-level telemetry stored in a Seq server:
//!
//! ```text
//!   Scheduler ──> Fetcher ──> archive file ──> RecordMapper ──┬──> Analysis
//!                  (Seq API, paged)                           └──> Webhook
//! ```
//!
//! # Components
//!
//! - **[`record`]**: Maps raw Seq events (property bags) into [`record::LogRecord`]
//! - **[`fetcher`]**: Pages through `/api/events` for a time window, streaming into an archive
//! - **[`analysis`]**: Aggregate reports over a record set
//! - **[`webhook`]**: JSON delivery of records to a webhook, with an external retry loop
//! - **[`scheduler`]**: Recurring fetch-and-deliver loop with cooperative cancellation
//! - **[`archive`]**: Discovery and loading of archive files in the backup directory
//! - **[`export`]**: CSV and HTML renderings of a record set
//! - **[`cleaner`]**: Retention cleanup of old archive and export files

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod analysis;
pub mod archive;
pub mod cleaner;
pub mod config;
pub mod export;
pub mod fetcher;
pub mod http;
pub mod logger;
pub mod record;
pub mod scheduler;
pub mod webhook;

pub use analysis::{analyze, AnalysisReport};
pub use config::Config;
pub use fetcher::{FetchStatus, FetchSummary, Fetcher, Preset, TimeWindow};
pub use record::{map_event, map_events, LogRecord, RawEvent};
pub use scheduler::{CycleReport, DeliveryOutcome, Scheduler, SchedulerHandle, SchedulerStatus};
pub use webhook::{deliver_with_retry, DeliveryError, RetryPolicy, WebhookDispatcher};
