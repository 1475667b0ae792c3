//! Down alerts.
//!
//! Delivery is fire-and-forget: a failed webhook call is logged and dropped,
//! it never fails the check cycle and is never retried.

use std::time::{Duration, SystemTime};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

/// A probe that has been up before was just observed down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownAlert {
    pub probe_name: String,
    pub observed_at: SystemTime,
    pub last_up: SystemTime,
}

fn ctime(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%a %b %e %H:%M:%S %Y").to_string()
}

impl DownAlert {
    /// Human readable alert text
    pub fn message(&self) -> String {
        format!(
            "Service {} is down!\nLast checked: {}\nLast up: {}",
            self.probe_name,
            ctime(self.observed_at),
            ctime(self.last_up)
        )
    }
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Deliver one alert. Must not fail; delivery problems are only logged.
    async fn dispatch(&self, alert: &DownAlert);
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts `{"text": "<message>"}` to a webhook URL
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("pochta/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl AlertDispatcher for WebhookDispatcher {
    async fn dispatch(&self, alert: &DownAlert) {
        let message = alert.message();
        let payload = WebhookPayload { text: &message };

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(probe = %alert.probe_name, "Down alert delivered");
            }
            Ok(response) => {
                warn!(
                    probe = %alert.probe_name,
                    status = %response.status(),
                    "Webhook rejected down alert"
                );
            }
            Err(e) => {
                warn!(probe = %alert.probe_name, error = %e, "Failed to deliver down alert");
            }
        }
    }
}

/// Used when no webhook is configured; the alert only goes to the log
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(&self, alert: &DownAlert) {
        warn!(probe = %alert.probe_name, "{}", alert.message().replace('\n', "; "));
    }
}
