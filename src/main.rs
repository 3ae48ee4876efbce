//! listsift — Binary Entrypoint
//! Runs one relevance digest pass and exits. An external scheduler (cron,
//! every few hours) re-invokes it; all cross-run state lives in the
//! configured state directory.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use listsift::config::Config;
use listsift::fetch::{SourceClient, DEFAULT_BASE_URL};
use listsift::model::RunStatus;
use listsift::notify::{discord::DiscordSink, email::EmailSink, slack::SlackSink, DigestSink};
use listsift::oracle::{OpenAiProvider, RelevanceOracle};
use listsift::runner::PipelineRunner;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("listsift=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::load_default().context("loading configuration")?;
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let bearer = std::env::var("SOCIALDATA_API_KEY").context("SOCIALDATA_API_KEY missing")?;
    let base_url = config
        .source_base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let source = SourceClient::new(base_url, bearer, timeout)?;

    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY missing")?;
    let provider = Arc::new(OpenAiProvider::new(
        api_key,
        config.oracle_model.clone(),
        timeout,
    )?);
    let oracle = RelevanceOracle::new(
        provider,
        config.profile.clone(),
        config.max_attempts,
        Duration::from_millis(config.backoff_base_ms),
        config.oracle_workers,
    );

    let mut sinks: Vec<Box<dyn DigestSink>> = Vec::new();
    if let Some(s) = DiscordSink::from_env() {
        sinks.push(Box::new(s));
    }
    if let Some(s) = SlackSink::from_env() {
        sinks.push(Box::new(s));
    }
    if let Some(s) = EmailSink::from_env() {
        sinks.push(Box::new(s));
    }
    if sinks.is_empty() {
        tracing::warn!("no notification sinks configured");
    }

    let runner = PipelineRunner::new(config, source, oracle, sinks);
    let record = runner.run_once().await?;

    tracing::info!(
        status = ?record.status,
        fetched = record.fetched,
        new = record.new,
        engaged = record.engaged,
        scored = record.scored,
        qualified = record.qualified,
        delivered = record.delivered,
        "run complete"
    );

    if record.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
