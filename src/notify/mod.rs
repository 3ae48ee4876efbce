// src/notify/mod.rs
pub mod discord;
pub mod email;
pub mod slack;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::model::Digest;

/// One delivery target. Sinks with payload-size limits truncate rendered
/// content deterministically rather than failing.
#[async_trait]
pub trait DigestSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError>;
}

#[derive(Debug)]
pub struct DeliveryResult {
    pub sink: &'static str,
    pub outcome: Result<(), SinkError>,
}

impl DeliveryResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Deliver `digest` to every sink, collecting per-sink outcomes. A failing
/// sink never blocks the others, and nothing is re-sent to a sink that
/// already succeeded.
pub async fn deliver_all(digest: &Digest, sinks: &[Box<dyn DigestSink>]) -> Vec<DeliveryResult> {
    let mut results = Vec::with_capacity(sinks.len());
    for sink in sinks {
        let outcome = sink.deliver(digest).await;
        match &outcome {
            Ok(()) => tracing::info!(sink = sink.name(), "digest delivered"),
            Err(e) => {
                tracing::warn!(sink = sink.name(), error = %e, "sink delivery failed");
                metrics::counter!("sink_failures_total").increment(1);
            }
        }
        results.push(DeliveryResult {
            sink: sink.name(),
            outcome,
        });
    }
    results
}

/// Head-preserving truncation in chars, with an explicit ellipsis marker.
/// Highest-ranked items render first, so the head is what survives a cap.
///
/// The cut lands on the last whole item separator that fits, so a capped
/// digest never shows a bisected item or its header. Content without
/// separators falls back to a plain char-boundary cut.
pub fn truncate_for_sink(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let head: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    if let Some(pos) = head.rfind(crate::digest::ITEM_SEPARATOR) {
        let cut = &head[..pos];
        if !cut.trim().is_empty() {
            return format!("{}…", cut.trim_end());
        }
    }
    format!("{}…", head.trim_end())
}
