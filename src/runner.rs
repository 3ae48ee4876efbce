// src/runner.rs
//! Pipeline orchestration: one pass per invocation.
//!
//! Stages run sequentially (`Fetching → Deduping → Filtering → Scoring →
//! Digesting → Notifying → Committing → Done`); only oracle scoring fans
//! out. Dedupe state is committed exclusively at the end of a successful
//! pass, so any earlier failure leaves the next scheduled run free to
//! re-attempt the same items.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use metrics::{describe_counter, describe_gauge};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dedupe::Deduplicator;
use crate::digest;
use crate::error::FetchError;
use crate::fetch::{FetchPage, SourceClient};
use crate::filter;
use crate::ledger::RunLedger;
use crate::model::{RunRecord, RunStatus};
use crate::notify::{self, DigestSink};
use crate::oracle::RelevanceOracle;

/// Stage names for logs and the failure context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Deduping,
    Filtering,
    Scoring,
    Digesting,
    Notifying,
    Committing,
}

#[derive(Debug, Default)]
struct StageCounts {
    fetched: usize,
    new: usize,
    engaged: usize,
    scored: usize,
    qualified: usize,
    delivered: usize,
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Completed pipeline passes.");
        describe_counter!("fetch_items_total", "Items fetched from the list endpoint.");
        describe_counter!("dedupe_skipped_total", "Items dropped as already seen.");
        describe_counter!(
            "engagement_filtered_total",
            "Items dropped below the likes threshold."
        );
        describe_counter!("oracle_calls_total", "Judgment oracle calls, including retries.");
        describe_counter!("oracle_failures_total", "Items excluded after oracle failure.");
        describe_counter!("digest_items_total", "Items that qualified for a digest.");
        describe_counter!("sink_failures_total", "Per-sink delivery failures.");
        describe_gauge!("pipeline_last_run_ts", "Unix ts of the last pipeline pass.");
    });
}

pub struct PipelineRunner {
    config: Config,
    source: SourceClient,
    oracle: RelevanceOracle,
    sinks: Vec<Box<dyn DigestSink>>,
    cancel: CancellationToken,
}

impl PipelineRunner {
    pub fn new(
        config: Config,
        source: SourceClient,
        oracle: RelevanceOracle,
        sinks: Vec<Box<dyn DigestSink>>,
    ) -> Self {
        Self {
            config,
            source,
            oracle,
            sinks,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for cooperative cancellation. Checked between stages (before
    /// the scoring pool and before notifying); in-flight oracle calls drain
    /// rather than being hard-aborted.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute one full pass and append its record to the run ledger.
    ///
    /// Pipeline failures are reported inside the returned record
    /// (`RunStatus::Failed` plus an error string); `Err` is reserved for the
    /// ledger itself being unwritable.
    pub async fn run_once(&self) -> Result<RunRecord> {
        ensure_metrics_described();
        let started_at = Utc::now();
        let mut counts = StageCounts::default();

        let outcome = self.drive(&mut counts).await;
        let (status, error) = match outcome {
            Ok(status) => (status, None),
            Err(e) => {
                tracing::error!(error = ?e, "pipeline run failed");
                (RunStatus::Failed, Some(format!("{e:#}")))
            }
        };

        let record = RunRecord {
            started_at,
            fetched: counts.fetched,
            new: counts.new,
            engaged: counts.engaged,
            scored: counts.scored,
            qualified: counts.qualified,
            delivered: counts.delivered,
            status,
            error,
        };
        RunLedger::new(&self.config.state_dir)
            .append(&record)
            .context("appending run ledger")?;

        metrics::counter!("pipeline_runs_total").increment(1);
        metrics::gauge!("pipeline_last_run_ts").set(started_at.timestamp() as f64);
        Ok(record)
    }

    async fn drive(&self, counts: &mut StageCounts) -> Result<RunStatus> {
        // Fetching
        tracing::debug!(stage = ?Stage::Fetching, list_id = %self.config.list_id, "stage enter");
        let page = self.fetch_with_retry().await.context("fetching list")?;
        counts.fetched = page.items.len();

        // Deduping. A corrupt state file halts the run before anything is
        // delivered, to avoid double-notifying.
        tracing::debug!(stage = ?Stage::Deduping, "stage enter");
        let mut dedupe = Deduplicator::load(&self.config.state_dir, self.config.dedupe_horizon_days)
            .context("loading dedupe state")?;
        let new_items = dedupe.filter_new(&page.items);
        counts.new = new_items.len();
        metrics::counter!("dedupe_skipped_total")
            .increment((counts.fetched - counts.new) as u64);

        if new_items.is_empty() {
            tracing::info!(fetched = counts.fetched, "no new items after dedupe, clean no-op");
            dedupe
                .commit(&page.items, Utc::now())
                .context("committing dedupe state")?;
            return Ok(RunStatus::Done);
        }

        // Filtering
        tracing::debug!(stage = ?Stage::Filtering, "stage enter");
        let engaged = filter::by_engagement(new_items, self.config.min_likes);
        counts.engaged = engaged.len();
        metrics::counter!("engagement_filtered_total")
            .increment((counts.new - counts.engaged) as u64);

        if self.cancel.is_cancelled() {
            tracing::info!("cancelled before scoring");
            return Ok(RunStatus::Cancelled);
        }

        // Scoring. Per-item failures degrade the run instead of failing it.
        tracing::debug!(stage = ?Stage::Scoring, items = counts.engaged, "stage enter");
        let batch = self.oracle.score_all(engaged).await;
        counts.scored = batch.scored.len();
        let degraded_scoring = !batch.failures.is_empty();

        // Digesting
        tracing::debug!(stage = ?Stage::Digesting, "stage enter");
        let built = digest::build(batch.scored, self.config.score_threshold);
        counts.qualified = built.items.len();

        if self.cancel.is_cancelled() {
            tracing::info!("cancelled before notifying");
            return Ok(RunStatus::Cancelled);
        }

        // Notifying. Empty digests suppress notification; that is success.
        tracing::debug!(stage = ?Stage::Notifying, qualified = counts.qualified, "stage enter");
        let mut degraded_delivery = false;
        if built.is_empty() {
            tracing::info!("empty digest, notification suppressed");
        } else if self.sinks.is_empty() {
            tracing::warn!("no sinks configured, digest rendered but not delivered");
        } else {
            let results = notify::deliver_all(&built, &self.sinks).await;
            counts.delivered = results.iter().filter(|r| r.succeeded()).count();
            if counts.delivered == 0 {
                // Nothing went out; abort before commit so the next run
                // re-attempts delivery of the same items.
                return Err(anyhow!("all sinks failed, digest not delivered"));
            }
            degraded_delivery = counts.delivered < results.len();
        }

        // Committing. All fetched ids are marked seen, scored or not, so an
        // unscorable item cannot loop through every future run.
        tracing::debug!(stage = ?Stage::Committing, "stage enter");
        dedupe
            .commit(&page.items, Utc::now())
            .context("committing dedupe state")?;

        if degraded_scoring || degraded_delivery {
            Ok(RunStatus::DoneDegraded)
        } else {
            Ok(RunStatus::Done)
        }
    }

    async fn fetch_with_retry(&self) -> Result<FetchPage, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.source.fetch(&self.config.list_id, None).await {
                Ok(page) => return Ok(page),
                Err(FetchError::Transient(msg)) if attempt < self.config.max_attempts => {
                    tracing::warn!(attempt, error = %msg, "transient fetch failure, backing off");
                    let delay = self.config.backoff_base_ms << (attempt - 1);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
