//! Client for the HTTP GPIO helper that switches the boiler.
//!
//! The helper takes a single `cmd` query parameter; anything but HTTP 200
//! counts as a failure. Every outcome is recorded on each coordinator.

use std::sync::Arc;

use serde::Serialize;
use tracing::error;
use tracing::info;

use crate::config::GpioConfig;
use crate::coordinator::Coordinator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GpioOutcome {
    pub command: String,
    pub result: String,
    pub success: bool,
}

pub struct GpioClient {
    client: reqwest::Client,
    default_url: String,
}

impl GpioClient {
    pub fn new(config: &GpioConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            default_url: config.url.clone(),
        })
    }

    /// Send `command` to `url` (or the configured endpoint).
    pub async fn send(&self, command: &str, url: Option<&str>) -> GpioOutcome {
        let url = url.unwrap_or(&self.default_url);
        info!("GPIO command {} to {}", command, url);

        let response = self
            .client
            .get(url)
            .query(&[("cmd", command)])
            .send()
            .await;

        let (result, success) = match response {
            Ok(response) => {
                let success = response.status() == reqwest::StatusCode::OK;
                match response.text().await {
                    Ok(body) => (body, success),
                    Err(e) => (e.to_string(), false),
                }
            }
            Err(e) => {
                error!("GPIO command '{}' failed: {}", command, e);
                (e.to_string(), false)
            }
        };

        GpioOutcome {
            command: command.to_string(),
            result,
            success,
        }
    }

    /// Send `command` and record the outcome on every coordinator.
    pub async fn dispatch(
        &self,
        command: &str,
        url: Option<&str>,
        coordinators: &[Arc<Coordinator>],
    ) -> GpioOutcome {
        let outcome = self.send(command, url).await;
        for coordinator in coordinators {
            coordinator.record_gpio_result(&outcome.command, &outcome.result, outcome.success);
        }
        outcome
    }
}
