// src/notify/discord.rs
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{truncate_for_sink, DigestSink};
use crate::error::SinkError;
use crate::model::Digest;

/// Discord caps embed descriptions at 2000 chars; longer digests are
/// truncated head-first so the highest-ranked items survive.
pub const EMBED_DESCRIPTION_CAP: usize = 2000;

#[derive(Clone)]
pub struct DiscordSink {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordSink {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("DISCORD_WEBHOOK_URL").ok().map(Self::new)
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    fn payload(&self, digest: &Digest) -> DiscordWebhookPayload {
        DiscordWebhookPayload {
            content: Some(format!(
                "New list digest: {} relevant post(s)",
                digest.items.len()
            )),
            embeds: vec![DiscordEmbed {
                title: "List Digest".to_string(),
                description: truncate_for_sink(&digest.rendered, EMBED_DESCRIPTION_CAP),
            }],
        }
    }
}

#[async_trait]
impl DigestSink for DiscordSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError> {
        let payload = self.payload(digest);

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match res {
                Ok(rsp) => {
                    if let Err(e) = rsp.error_for_status_ref() {
                        if attempt < self.max_retries {
                            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1)))
                                .await;
                            continue;
                        }
                        return Err(SinkError {
                            sink: self.name(),
                            message: format!("webhook HTTP error: {e}"),
                        });
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
                        continue;
                    }
                    return Err(SinkError {
                        sink: self.name(),
                        message: format!("webhook request failed: {e}"),
                    });
                }
            }
        }
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}
