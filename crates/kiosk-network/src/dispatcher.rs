//! Webhook delivery of accepted scans.
//!
//! Each accepted [`ScanEvent`] is POSTed once to the configured endpoint as
//! `{"card_id": "<HEX>"}` and the answer is classified:
//!
//! | Answer | Outcome |
//! |--------|---------|
//! | 2xx status | `Delivered` |
//! | any other status | `Rejected`, detail `HTTP <code>` |
//! | connect error, timeout, no response | `Unreachable` |
//!
//! Delivery is at-most-once. A retry could repeat whatever the business
//! system does when it sees the card, so a failed call is reported and
//! never repeated.

#![allow(async_fn_in_trait)]

use crate::error::{NetworkError, Result};
use kiosk_core::config::WebhookConfig;
use kiosk_core::constants::SECRET_HEADER;
use kiosk_core::{DeliveryResult, ScanEvent};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Delivery of one scan event to the external system.
///
/// Implementations never fail: every problem is folded into the returned
/// [`DeliveryResult`].
pub trait Dispatch: Send + Sync {
    async fn deliver(&self, event: &ScanEvent) -> DeliveryResult;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    card_id: &'a str,
}

/// HTTP webhook dispatcher.
///
/// # Examples
///
/// ```no_run
/// use kiosk_core::{CardIdentifier, ScanEvent};
/// use kiosk_network::{Dispatch, WebhookDispatcher};
/// use std::time::Duration;
///
/// # async fn example() -> kiosk_network::Result<()> {
/// let dispatcher = WebhookDispatcher::new(
///     "https://erp.example.com/kiosk/scan",
///     Some("s3cret".to_string()),
///     Duration::from_secs(5),
/// )?;
///
/// let event = ScanEvent::new("04A1B2C3".parse::<CardIdentifier>().unwrap());
/// let result = dispatcher.deliver(&event).await;
/// println!("{}", result.outcome());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
    timeout: Duration,
}

impl WebhookDispatcher {
    /// Create a dispatcher for `url`. The timeout bounds the whole request.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Client` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, secret: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::client(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            secret,
            timeout,
        })
    }

    /// Create a dispatcher from the `[webhook]` configuration section.
    ///
    /// Without a configured secret the development fallback is used and a
    /// warning is logged.
    ///
    /// # Errors
    ///
    /// Returns `NetworkError::Config` if no URL is configured.
    pub fn from_config(config: &WebhookConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| NetworkError::config("webhook URL is not set"))?;

        let (secret, is_fallback) = config.effective_secret();
        if is_fallback {
            warn!("No webhook secret configured, using the development fallback. Do not use this in production");
        }

        Self::new(url, Some(secret.to_string()), config.timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn describe_transport_error(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!("no response within {}ms", self.timeout.as_millis())
        } else if err.is_connect() {
            "connection failed".to_string()
        } else {
            err.to_string()
        }
    }
}

impl Dispatch for WebhookDispatcher {
    async fn deliver(&self, event: &ScanEvent) -> DeliveryResult {
        let card_id = event.identifier().to_hex();

        let mut request = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { card_id: &card_id });
        if let Some(secret) = &self.secret {
            request = request.header(SECRET_HEADER, secret.as_str());
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!(card_id = %card_id, status = response.status().as_u16(), "Card delivered");
                DeliveryResult::delivered(event)
            }
            Ok(response) => {
                let status = response.status().as_u16();
                warn!(card_id = %card_id, status, "Card rejected by webhook");
                DeliveryResult::rejected(event, format!("HTTP {status}"))
            }
            Err(e) => {
                let detail = self.describe_transport_error(&e);
                warn!(card_id = %card_id, error = %e, "Webhook unreachable");
                DeliveryResult::unreachable(event, detail)
            }
        }
    }
}
