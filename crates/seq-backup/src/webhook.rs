// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of mapped records to a downstream webhook.
//!
//! [`WebhookDispatcher::deliver`] performs exactly one POST of the whole
//! record set. Retrying is left to [`deliver_with_retry`], which the
//! scheduler and the manual send path share.

use core::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, WebhookConfig};
use crate::http::get_client;
use crate::record::LogRecord;

const DEFAULT_HEADER: &str = "Authorization";

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum DeliveryError {
    #[error("webhook delivery disabled or URL missing")]
    Disabled,
    #[error("invalid webhook header: {0}")]
    InvalidHeader(String),
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("webhook rejected the payload with {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeliveryError::Rejected { .. } | DeliveryError::Request(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl From<&WebhookConfig> for RetryPolicy {
    fn from(config: &WebhookConfig) -> Self {
        RetryPolicy {
            max_attempts: config.retry_count.max(1),
            interval: Duration::from_secs(config.retry_interval_secs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookDispatcher {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_client(get_client(config), config.webhook.clone())
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, config: WebhookConfig) -> Self {
        WebhookDispatcher { client, config }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    fn auth_header(&self) -> Result<Option<(HeaderName, HeaderValue)>, DeliveryError> {
        if self.config.token.is_empty() {
            return Ok(None);
        }
        let name = match self.config.header.trim() {
            "" => DEFAULT_HEADER,
            name => name,
        };
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DeliveryError::InvalidHeader(format!("{name}: {e}")))?;
        let mut value = HeaderValue::from_str(&self.config.token)
            .map_err(|e| DeliveryError::InvalidHeader(format!("{name} value: {e}")))?;
        value.set_sensitive(true);
        Ok(Some((name, value)))
    }

    /// Sends `records` as one JSON array. Any 2xx status is success.
    ///
    /// # Errors
    ///
    /// `Disabled` without touching the network when sending is switched off
    /// or no URL is set; otherwise the reason the attempt failed.
    pub async fn deliver(&self, records: &[LogRecord]) -> Result<(), DeliveryError> {
        if !self.is_enabled() {
            return Err(DeliveryError::Disabled);
        }

        let body = serde_json::to_vec(records)?;
        let mut request = self
            .client
            .post(self.config.url.trim())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some((name, value)) = self.auth_header()? {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), count = records.len(), "Webhook accepted payload");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

/// Delivers with up to `policy.max_attempts` attempts, sleeping `policy.interval`
/// between them. Never sleeps after the last attempt.
///
/// Returns `false` without retrying when delivery is disabled or the failure
/// cannot be fixed by retrying, and as soon as `cancel` fires during a sleep.
pub async fn deliver_with_retry(
    dispatcher: &WebhookDispatcher,
    records: &[LogRecord],
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> bool {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match dispatcher.deliver(records).await {
            Ok(()) => {
                info!(attempt, count = records.len(), "Records delivered to webhook");
                return true;
            }
            Err(DeliveryError::Disabled) => {
                warn!("Webhook payload not sent (disabled or URL missing)");
                return false;
            }
            Err(e) if !e.is_retryable() => {
                error!("Webhook delivery failed: {e}");
                return false;
            }
            Err(e) => {
                warn!(attempt, max_attempts, "Webhook delivery attempt failed: {e}");
            }
        }

        if attempt < max_attempts {
            debug!(
                delay_secs = policy.interval.as_secs_f64(),
                "Retrying webhook delivery"
            );
            tokio::select! {
                () = cancel.cancelled() => {
                    info!(attempt, "Webhook retry cancelled");
                    return false;
                }
                () = tokio::time::sleep(policy.interval) => {}
            }
        }
    }

    error!(
        attempts = max_attempts,
        "Webhook delivery failed after all retries"
    );
    false
}
