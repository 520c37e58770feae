// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::config::{
    deserialize_string_or_int, log_level::LogLevel, Config, ConfigError, ConfigSource,
};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "SEQ_BACKUP_";

/// `SEQ_BACKUP_*` overrides. figment strips the prefix and lowercases the rest.
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub seq_url: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub api_key: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub backup_directory: Option<String>,
    pub log_level: Option<LogLevel>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub webhook_url: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub webhook_token: Option<String>,
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    if let Some(seq_url) = &env_config.seq_url {
        config.seq_url.clone_from(seq_url);
    }
    if let Some(api_key) = &env_config.api_key {
        config.api_key.clone_from(api_key);
    }
    if let Some(dir) = &env_config.backup_directory {
        config.backup_directory = PathBuf::from(dir);
    }
    if let Some(level) = env_config.log_level {
        config.log_level = level;
    }
    if let Some(url) = &env_config.webhook_url {
        config.webhook.url.clone_from(url);
    }
    if let Some(token) = &env_config.webhook_token {
        config.webhook.token.clone_from(token);
    }
}

#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<EnvConfig>() {
            Ok(env_config) => merge_config(config, &env_config),
            Err(e) => {
                return Err(ConfigError::Parse(format!(
                    "Failed to parse config from environment variables: {e}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SEQ_BACKUP_BACKUP_DIRECTORY", "/var/backups/seq");
            jail.set_env("SEQ_BACKUP_WEBHOOK_TOKEN", "Bearer t0k");
            jail.set_env("SEQ_BACKUP_LOG_LEVEL", "WARN");

            let mut config = Config::default();
            EnvConfigSource.load(&mut config).unwrap();

            assert_eq!(config.backup_directory, PathBuf::from("/var/backups/seq"));
            assert_eq!(config.webhook.token, "Bearer t0k");
            assert_eq!(config.log_level, LogLevel::Warn);
            assert_eq!(config.seq_url, "");
            Ok(())
        });
    }

    #[test]
    fn test_blank_values_do_not_override() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env("SEQ_BACKUP_API_KEY", "");

            let mut config = Config {
                api_key: "from-file".to_string(),
                ..Config::default()
            };
            EnvConfigSource.load(&mut config).unwrap();
            assert_eq!(config.api_key, "from-file");
            Ok(())
        });
    }
}
