// src/notify/slack.rs
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{truncate_for_sink, DigestSink};
use crate::error::SinkError;
use crate::model::Digest;

/// Slack accepts much larger payloads than Discord; this is a conservative
/// cap for readable channel messages.
const TEXT_CAP: usize = 4000;

pub struct SlackSink {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackSink {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("SLACK_WEBHOOK_URL").ok().map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl DigestSink for SlackSink {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError> {
        let text = format!(
            "*New list digest* ({} relevant post(s))\n{}",
            digest.items.len(),
            truncate_for_sink(&digest.rendered, TEXT_CAP)
        );
        let body = serde_json::json!({ "text": text });

        let rsp = self
            .client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError {
                sink: self.name(),
                message: format!("slack post: {e}"),
            })?;

        rsp.error_for_status().map_err(|e| SinkError {
            sink: self.name(),
            message: format!("slack non-2xx: {e}"),
        })?;
        Ok(())
    }
}
