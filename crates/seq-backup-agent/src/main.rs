// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use seq_backup::archive::{
    all_archives, available_periods, files_for_period, load_records, GroupBy,
};
use seq_backup::cleaner::cleanup_old_files;
use seq_backup::config::{self, log_level::LogLevel, Config};
use seq_backup::export::{export, ExportFormat};
use seq_backup::logger::Formatter;
use seq_backup::scheduler::deliver_latest_archive;
use seq_backup::{
    analyze, deliver_with_retry, FetchStatus, Fetcher, LogRecord, Preset, RetryPolicy, Scheduler,
    TimeWindow, WebhookDispatcher,
};

#[derive(Parser, Debug)]
#[command(
    name = "seq-backup-agent",
    version,
    about = "Fetch, archive, analyze and forward Seq request logs"
)]
struct Cli {
    /// Configuration file (defaults to $SEQ_BACKUP_CONFIG, then config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one window from Seq into a new archive
    Fetch {
        /// today, yesterday, last-hour, last-6-hours or last-12-hours (UTC)
        #[arg(long, conflicts_with_all = ["start", "end"])]
        preset: Option<Preset>,

        /// Local start time, e.g. 2025-04-17T00:00:00
        #[arg(long, required_unless_present = "preset")]
        start: Option<String>,

        /// Local end time; defaults to start + 1 day
        #[arg(long, requires = "start")]
        end: Option<String>,
    },

    /// Analyze archives of one period, or list the available periods
    Analyze {
        #[arg(long, default_value = "day")]
        group: GroupBy,

        /// Period key as listed without this flag, e.g. 2025-04-17 or 2025/W16
        #[arg(long)]
        period: Option<String>,

        #[arg(long)]
        export: Option<ExportFormat>,

        /// Send the analyzed records to the webhook
        #[arg(long)]
        send: bool,
    },

    /// Analyze every archive in the backup directory
    AnalyzeAll {
        #[arg(long)]
        export: Option<ExportFormat>,

        #[arg(long)]
        send: bool,
    },

    /// Run the scheduler until Ctrl-C
    Schedule,

    /// Send the latest archive to the webhook
    TestWebhook,

    /// Delete archives and exports older than the given number of days
    Clean {
        #[arg(long, default_value_t = 30)]
        days: u64,
    },
}

fn init_logging(log_level: LogLevel) -> anyhow::Result<()> {
    let env_filter = format!(
        "hyper=off,reqwest=off,rustls=off,{}",
        log_level.as_directive()
    );

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).context("could not parse log level in configuration")?,
        )
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    debug!("Logging subsystem enabled");
    Ok(())
}

/// Accepts RFC 3339, or a local `YYYY-MM-DD[( |T)HH:MM[:SS]]`.
fn parse_local_time(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("invalid time '{raw}'"))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("'{raw}' does not exist in the local time zone"))
}

fn fetch_window(
    preset: Option<Preset>,
    start: Option<&str>,
    end: Option<&str>,
) -> anyhow::Result<TimeWindow> {
    if let Some(preset) = preset {
        return Ok(preset.window(Utc::now()));
    }
    let start = parse_local_time(start.ok_or_else(|| anyhow!("--start or --preset is required"))?)?;
    let end = match end {
        Some(end) => parse_local_time(end)?,
        None => start + Duration::days(1),
    };
    Ok(TimeWindow::new(start, end))
}

async fn run_fetch(config: &Config, window: TimeWindow) -> anyhow::Result<()> {
    info!(
        "Fetching logs from {} to {}",
        window.start.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        window.end.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    let summary = Fetcher::new(config).fetch(&window).await?;
    match &summary.status {
        FetchStatus::Complete => println!(
            "Saved {} events to {}",
            summary.total,
            summary.path.display()
        ),
        FetchStatus::Aborted(e) => println!(
            "Fetch aborted after {} events ({e}); partial archive at {}",
            summary.total,
            summary.path.display()
        ),
    }
    Ok(())
}

async fn report_export_send(
    config: &Config,
    records: &[LogRecord],
    export_format: Option<ExportFormat>,
    send: bool,
) -> anyhow::Result<()> {
    if records.is_empty() {
        warn!("No records to analyze");
        return Ok(());
    }

    println!("{}", analyze(records));

    if let Some(format) = export_format {
        let path = export(records, format, &config.export_directory).await?;
        println!("Exported to {}", path.display());
    }

    if send {
        let dispatcher = WebhookDispatcher::new(config);
        let policy = RetryPolicy::from(&config.webhook);
        if deliver_with_retry(&dispatcher, records, &policy, &CancellationToken::new()).await {
            println!("Records sent to webhook");
        } else {
            println!("Records were not sent to webhook");
        }
    }
    Ok(())
}

async fn run_analyze(
    config: &Config,
    group: GroupBy,
    period: Option<String>,
    export_format: Option<ExportFormat>,
    send: bool,
) -> anyhow::Result<()> {
    let Some(period) = period else {
        let periods = available_periods(&config.backup_directory, group).await;
        if periods.is_empty() {
            println!(
                "No log files found in {}",
                config.backup_directory.display()
            );
        }
        for key in periods {
            println!("{key}");
        }
        return Ok(());
    };

    let files = files_for_period(&config.backup_directory, group, &period).await;
    if files.is_empty() {
        bail!("no archives found for {group} '{period}'");
    }
    info!(files = files.len(), %group, %period, "Loading archives");
    let records = load_records(&files).await;
    report_export_send(config, &records, export_format, send).await
}

async fn run_schedule(config: &Config) -> anyhow::Result<()> {
    let handle = Scheduler::new(config).start();
    if handle.is_finished() {
        println!("Scheduler is disabled (Scheduler.Enabled = false)");
        return Ok(());
    }

    println!("Scheduler started, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    println!("Scheduler stopping...");
    handle.stop().await;
    handle.join().await;
    Ok(())
}

async fn run_test_webhook(config: &Config) {
    let dispatcher = WebhookDispatcher::new(config);
    let policy = RetryPolicy::from(&config.webhook);
    let outcome = deliver_latest_archive(
        &config.backup_directory,
        &dispatcher,
        &policy,
        &CancellationToken::new(),
    )
    .await;
    println!("{outcome:?}");
}

async fn run_clean(config: &Config, days: u64) {
    let mut removed = cleanup_old_files(&config.backup_directory, days).await;
    if config.export_directory != config.backup_directory {
        removed += cleanup_old_files(&config.export_directory, days).await;
    }
    println!("Cleaned up {removed} old file(s) older than {days} days");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::config_path);
    let config = Config::load(&config_path);
    init_logging(config.as_ref().map_or(LogLevel::default(), |c| c.log_level))?;
    let config = config
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Fetch { preset, start, end } => {
            let window = fetch_window(preset, start.as_deref(), end.as_deref())?;
            run_fetch(&config, window).await
        }
        Command::Analyze {
            group,
            period,
            export,
            send,
        } => run_analyze(&config, group, period, export, send).await,
        Command::AnalyzeAll { export, send } => {
            let files = all_archives(&config.backup_directory).await;
            if files.is_empty() {
                bail!(
                    "no log files found in {}",
                    config.backup_directory.display()
                );
            }
            let records = load_records(&files).await;
            report_export_send(&config, &records, export, send).await
        }
        Command::Schedule => run_schedule(&config).await,
        Command::TestWebhook => {
            run_test_webhook(&config).await;
            Ok(())
        }
        Command::Clean { days } => {
            run_clean(&config, days).await;
            Ok(())
        }
    }
}
