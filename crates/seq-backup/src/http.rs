// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client factory shared by the Seq fetcher and the webhook dispatcher.

use core::time::Duration;
use std::error::Error;

use tracing::error;

use crate::config::Config;

/// Builds a client honoring `RequestTimeoutSecs` and `HttpsProxy`.
///
/// An unusable proxy is logged and the client is rebuilt without it; if even
/// that fails, reqwest's defaults are used so callers always get a client.
#[must_use]
pub fn get_client(config: &Config) -> reqwest::Client {
    match build_client(config) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client_without_proxy(config) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, Box<dyn Error>> {
    build_client_inner(config, true)
}

fn build_client_without_proxy(config: &Config) -> Result<reqwest::Client, Box<dyn Error>> {
    build_client_inner(config, false)
}

fn build_client_inner(config: &Config, allow_proxy: bool) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .user_agent(concat!("seq-backup/", env!("CARGO_PKG_VERSION")));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}
