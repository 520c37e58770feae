// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration.
//!
//! Configuration is assembled by a [`ConfigBuilder`] from an ordered list of
//! [`ConfigSource`]s, later sources overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. The JSON configuration file ([`json::JsonConfigSource`])
//! 3. `SEQ_BACKUP_*` environment variables ([`env::EnvConfigSource`])
//!
//! The file uses PascalCase keys:
//!
//! ```json
//! {
//!   "SeqUrl": "https://seq.internal",
//!   "ApiKey": "...",
//!   "ApplicationName": "Billing.Api",
//!   "PageSize": 500,
//!   "Scheduler": { "Enabled": true, "IntervalMinutes": 60 },
//!   "Webhook": { "Url": "https://hooks.internal/logs", "SendFilteredLogs": true }
//! }
//! ```

pub mod env;
pub mod json;
pub mod log_level;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, error};

use crate::config::log_level::LogLevel;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "SEQ_BACKUP_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Largest accepted scheduler query offset, about a century either way.
pub const MAX_QUERY_OFFSET_MINUTES: i64 = 100 * 366 * 24 * 60;

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Sets `$config.$field` when the source value is `Some`.
macro_rules! merge_option_to_value {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field = value.clone();
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field = value.clone();
        }
    };
}
pub(crate) use merge_option_to_value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub query_start_offset_minutes: i64,
    pub query_end_offset_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            enabled: false,
            interval_minutes: 60,
            query_start_offset_minutes: -60,
            query_end_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub token: String,
    /// Header carrying `token` verbatim.
    pub header: String,
    /// Delivery switch; both scheduled and manual sends are no-ops when false.
    pub send_filtered_logs: bool,
    pub retry_count: u32,
    pub retry_interval_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            url: String::new(),
            token: String::new(),
            header: "Authorization".to_string(),
            send_filtered_logs: false,
            retry_count: 3,
            retry_interval_secs: 3,
        }
    }
}

impl WebhookConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.send_filtered_logs && !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct Config {
    pub seq_url: String,
    pub api_key: String,
    pub backup_directory: PathBuf,
    pub export_directory: PathBuf,
    pub application_name: String,
    pub environment: String,
    pub log_type: String,
    pub page_size: u32,
    pub log_level: LogLevel,
    pub request_timeout_secs: u64,
    pub https_proxy: Option<String>,
    pub scheduler: SchedulerConfig,
    pub webhook: WebhookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seq_url: String::new(),
            api_key: String::new(),
            backup_directory: PathBuf::from("Backups"),
            export_directory: PathBuf::from("exports"),
            application_name: String::new(),
            environment: "Production".to_string(),
            log_type: "Request".to_string(),
            page_size: 1000,
            log_level: LogLevel::default(),
            request_timeout_secs: 30,
            https_proxy: None,
            scheduler: SchedulerConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl Config {
    /// Loads the file at `path`, applies environment overrides and validates the result.
    ///
    /// # Errors
    ///
    /// `NotFound` when the file does not exist, `Parse` when it is malformed and
    /// `Invalid` when the merged values fail [`Config::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        ConfigBuilder::default()
            .add_source(Box::new(json::JsonConfigSource::new(path.as_ref())))
            .add_source(Box::new(env::EnvConfigSource))
            .build()
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.seq_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("SeqUrl is required".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "SeqUrl must be an http(s) URL, got '{url}'"
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "PageSize must be greater than 0".to_string(),
            ));
        }
        if self.webhook.retry_count == 0 {
            return Err(ConfigError::Invalid(
                "Webhook.RetryCount must be at least 1".to_string(),
            ));
        }
        if self.scheduler.enabled && self.scheduler.interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "Scheduler.IntervalMinutes must be greater than 0".to_string(),
            ));
        }
        for (key, minutes) in [
            ("QueryStartOffsetMinutes", self.scheduler.query_start_offset_minutes),
            ("QueryEndOffsetMinutes", self.scheduler.query_end_offset_minutes),
        ] {
            if minutes.unsigned_abs() > MAX_QUERY_OFFSET_MINUTES.unsigned_abs() {
                return Err(ConfigError::Invalid(format!(
                    "Scheduler.{key} ({minutes}) must be within {MAX_QUERY_OFFSET_MINUTES} minutes of now"
                )));
            }
        }
        if self.scheduler.query_start_offset_minutes > self.scheduler.query_end_offset_minutes {
            return Err(ConfigError::Invalid(format!(
                "Scheduler.QueryStartOffsetMinutes ({}) is after QueryEndOffsetMinutes ({})",
                self.scheduler.query_start_offset_minutes, self.scheduler.query_end_offset_minutes
            )));
        }
        Ok(())
    }

    /// Trailing slashes removed, ready for path concatenation.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.seq_url.trim().trim_end_matches('/')
    }
}

/// Path of the configuration file: `$SEQ_BACKUP_CONFIG`, or `config.json`.
#[must_use]
pub fn config_path() -> PathBuf {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    /// # Errors
    ///
    /// Returns the reason the source could not be applied.
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// # Errors
    ///
    /// Fails on the first source that cannot be loaded, or when the merged
    /// configuration does not validate.
    pub fn build(mut self) -> Result<Config, ConfigError> {
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("Failed to load config: {e}");
                return Err(e);
            }
        }

        // If `https_proxy` is not set, take it from `HTTPS_PROXY` if it exists
        if self.config.https_proxy.is_none() {
            if let Ok(https_proxy) = std::env::var("HTTPS_PROXY") {
                if !https_proxy.trim().is_empty() {
                    debug!("Using HTTPS_PROXY from environment");
                    self.config.https_proxy = Some(https_proxy);
                }
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }
}

/// Accepts a string or a number, mapping blank strings to `None`.
///
/// Environment values such as `SEQ_BACKUP_API_KEY=12345` arrive as numbers.
pub fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => {
            error!("Failed to parse value, expected a string or an integer, ignoring");
            Ok(None)
        }
    }
}
