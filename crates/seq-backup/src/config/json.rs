// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use figment::{
    providers::{Format, Json},
    Figment,
};
use serde::Deserialize;

use crate::config::{
    log_level::LogLevel, merge_option_to_value, Config, ConfigError, ConfigSource,
};

/// Shape of the JSON configuration file. Every key is optional.
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default, rename_all = "PascalCase")]
#[allow(clippy::module_name_repetitions)]
pub struct JsonConfig {
    pub seq_url: Option<String>,
    pub api_key: Option<String>,
    pub backup_directory: Option<PathBuf>,
    pub export_directory: Option<PathBuf>,
    pub application_name: Option<String>,
    pub environment: Option<String>,
    pub log_type: Option<String>,
    pub page_size: Option<u32>,
    pub log_level: Option<LogLevel>,
    pub request_timeout_secs: Option<u64>,
    pub https_proxy: Option<String>,
    pub scheduler: JsonSchedulerConfig,
    pub webhook: JsonWebhookConfig,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct JsonSchedulerConfig {
    pub enabled: Option<bool>,
    pub interval_minutes: Option<u64>,
    pub query_start_offset_minutes: Option<i64>,
    pub query_end_offset_minutes: Option<i64>,
}

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default, rename_all = "PascalCase")]
pub struct JsonWebhookConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub header: Option<String>,
    pub send_filtered_logs: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_interval_by_sec: Option<u64>,
}

fn merge_config(config: &mut Config, json_config: &JsonConfig) {
    merge_option_to_value!(config, json_config, seq_url);
    merge_option_to_value!(config, json_config, api_key);
    merge_option_to_value!(config, json_config, backup_directory);
    merge_option_to_value!(config, json_config, export_directory);
    merge_option_to_value!(config, json_config, application_name);
    merge_option_to_value!(config, json_config, environment);
    merge_option_to_value!(config, json_config, log_type);
    merge_option_to_value!(config, json_config, page_size);
    merge_option_to_value!(config, json_config, log_level);
    merge_option_to_value!(config, json_config, request_timeout_secs);
    if json_config.https_proxy.is_some() {
        config.https_proxy.clone_from(&json_config.https_proxy);
    }

    // Scheduler
    let scheduler = &json_config.scheduler;
    merge_option_to_value!(config.scheduler, scheduler, enabled);
    merge_option_to_value!(config.scheduler, scheduler, interval_minutes);
    merge_option_to_value!(config.scheduler, scheduler, query_start_offset_minutes);
    merge_option_to_value!(config.scheduler, scheduler, query_end_offset_minutes);

    // Webhook
    let webhook = &json_config.webhook;
    merge_option_to_value!(config.webhook, webhook, url);
    merge_option_to_value!(config.webhook, webhook, token);
    merge_option_to_value!(config.webhook, webhook, header);
    merge_option_to_value!(config.webhook, webhook, send_filtered_logs);
    merge_option_to_value!(config.webhook, webhook, retry_count);
    merge_option_to_value!(
        config.webhook,
        retry_interval_secs,
        webhook,
        retry_interval_by_sec
    );
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct JsonConfigSource {
    pub path: PathBuf,
}

impl JsonConfigSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for JsonConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        // figment treats a missing file as an empty source
        if !self.path.is_file() {
            return Err(ConfigError::NotFound(self.path.clone()));
        }

        let figment = Figment::new().merge(Json::file(&self.path));
        let json_config = figment
            .extract::<JsonConfig>()
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", self.path.display())))?;

        merge_config(config, &json_config);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sections_keep_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "partial.json",
                r#"{ "Scheduler": { "Enabled": true }, "Webhook": { "RetryCount": 7 } }"#,
            )?;

            let mut config = Config::default();
            JsonConfigSource::new("partial.json")
                .load(&mut config)
                .unwrap();

            assert!(config.scheduler.enabled);
            assert_eq!(config.scheduler.interval_minutes, 60);
            assert_eq!(config.scheduler.query_start_offset_minutes, -60);
            assert_eq!(config.webhook.retry_count, 7);
            assert_eq!(config.webhook.header, "Authorization");
            assert_eq!(config.webhook.retry_interval_secs, 3);
            Ok(())
        });
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("extra.json", r#"{ "Theme": "dark", "PageSize": 10 }"#)?;

            let mut config = Config::default();
            JsonConfigSource::new("extra.json").load(&mut config).unwrap();
            assert_eq!(config.page_size, 10);
            Ok(())
        });
    }
}
