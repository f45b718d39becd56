//! HTTP notification delivery. The client is built lazily on the
//! notification consumer thread; blocking there is fine, blocking on the
//! runtime thread is not.

use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::error::{NodeError, Result};
use crate::events::NotificationSink;

#[derive(Serialize)]
struct NotifyPayload<'a> {
    camera: &'a str,
    confidence: f32,
}

pub struct WebhookNotifier {
    url: String,
    client: Option<reqwest::blocking::Client>,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        info!(%url, "notifications via webhook");
        Self { url, client: None }
    }

    fn client(&mut self) -> Result<&reqwest::blocking::Client> {
        if self.client.is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| NodeError::Sink(e.to_string()))?;
            self.client = Some(client);
        }
        self.client
            .as_ref()
            .ok_or_else(|| NodeError::Sink("client unavailable".to_string()))
    }
}

impl NotificationSink for WebhookNotifier {
    fn notify(&mut self, camera: &str, confidence: f32) -> Result<()> {
        let url = self.url.clone();
        self.client()?
            .post(url)
            .json(&NotifyPayload { camera, confidence })
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| NodeError::Sink(e.to_string()))?;
        Ok(())
    }
}
