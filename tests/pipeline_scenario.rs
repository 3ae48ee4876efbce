// tests/pipeline_scenario.rs
//! End-to-end pipeline passes against a mocked list endpoint, a scripted
//! judgment provider, and in-memory sinks.

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use listsift::config::Config;
use listsift::dedupe::Deduplicator;
use listsift::error::{OracleError, SinkError};
use listsift::fetch::SourceClient;
use listsift::ledger::RunLedger;
use listsift::model::{Digest, RunStatus};
use listsift::notify::DigestSink;
use listsift::oracle::{JudgmentProvider, RelevanceOracle};
use listsift::runner::PipelineRunner;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scores by keyword in the prompt; items containing "flaky" always fail
/// with a transient error.
struct ScriptedProvider;

#[async_trait]
impl JudgmentProvider for ScriptedProvider {
    async fn judge(&self, prompt: &str) -> Result<String, OracleError> {
        if prompt.contains("flaky") {
            return Err(OracleError::Unavailable("scripted timeout".to_string()));
        }
        let score = if prompt.contains("alpha") {
            9
        } else if prompt.contains("beta") || prompt.contains("gamma") {
            8
        } else {
            3
        };
        Ok(format!("Score: {score}/10\nScripted rationale."))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    payloads: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl DigestSink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError> {
        self.payloads.lock().unwrap().push(digest.rendered.clone());
        Ok(())
    }
}

/// Flips the runner's cancellation token on its first judgment call, then
/// answers normally; models an operator cancelling mid-scoring.
#[derive(Clone, Default)]
struct CancellingProvider {
    token: Arc<Mutex<Option<CancellationToken>>>,
}

#[async_trait]
impl JudgmentProvider for CancellingProvider {
    async fn judge(&self, _prompt: &str) -> Result<String, OracleError> {
        if let Some(token) = self.token.lock().unwrap().as_ref() {
            token.cancel();
        }
        Ok("Score: 9/10\nStill relevant.".to_string())
    }

    fn name(&self) -> &'static str {
        "cancelling"
    }
}

struct FailingSink;

#[async_trait]
impl DigestSink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&self, _digest: &Digest) -> Result<(), SinkError> {
        Err(SinkError {
            sink: "failing",
            message: "scripted failure".to_string(),
        })
    }
}

fn tweet(id: u32, text: &str, likes: u64, reshares: u64) -> serde_json::Value {
    json!({
        "id_str": format!("t{id:02}"),
        "full_text": text,
        "favorite_count": likes,
        "retweet_count": reshares,
        "tweet_created_at": format!("2025-06-{:02}T12:00:00Z", (id % 27) + 1),
        "user": { "screen_name": format!("author_{id:02}") }
    })
}

/// 20 fetched, 8 past the likes filter, 3 scored >= 7.
fn window_of_20() -> serde_json::Value {
    let mut tweets = Vec::new();
    // 12 below the engagement threshold.
    for i in 1..=12 {
        tweets.push(tweet(i, "background noise", 3, 0));
    }
    // 5 engaged but not relevant.
    for i in 13..=17 {
        tweets.push(tweet(i, "engaged but off-topic", 30, 2));
    }
    // 3 engaged and relevant; beta out-engages gamma.
    tweets.push(tweet(18, "alpha: the big one", 15, 1));
    tweets.push(tweet(19, "beta: strong follow-up", 50, 10));
    tweets.push(tweet(20, "gamma: also solid", 20, 1));
    json!({ "tweets": tweets })
}

async fn mock_list_server(body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/twitter/list/list-1/tweets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    server
}

fn test_config(state_dir: &Path, base_url: String) -> Config {
    Config {
        list_id: "list-1".to_string(),
        profile: "AI agents for productivity".to_string(),
        min_likes: 10,
        score_threshold: 7,
        oracle_workers: 4,
        max_attempts: 2,
        backoff_base_ms: 1,
        dedupe_horizon_days: 14,
        request_timeout_secs: 5,
        state_dir: state_dir.to_path_buf(),
        source_base_url: Some(base_url),
        oracle_model: "test".to_string(),
    }
}

fn runner_with(
    config: Config,
    sinks: Vec<Box<dyn DigestSink>>,
) -> PipelineRunner {
    let source = SourceClient::new(
        config.source_base_url.clone().unwrap(),
        "test-bearer".to_string(),
        Duration::from_secs(5),
    )
    .unwrap();
    let oracle = RelevanceOracle::new(
        Arc::new(ScriptedProvider),
        config.profile.clone(),
        config.max_attempts,
        Duration::from_millis(config.backoff_base_ms),
        config.oracle_workers,
    );
    PipelineRunner::new(config, source, oracle, sinks)
}

#[tokio::test]
async fn twenty_fetched_eight_engaged_three_relevant() {
    let server = mock_list_server(window_of_20()).await;
    let state = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let runner = runner_with(
        test_config(state.path(), server.uri()),
        vec![Box::new(sink.clone())],
    );

    let record = runner.run_once().await.unwrap();

    assert_eq!(record.status, RunStatus::Done);
    assert_eq!(record.fetched, 20);
    assert_eq!(record.new, 20);
    assert_eq!(record.engaged, 8);
    assert_eq!(record.scored, 8);
    assert_eq!(record.qualified, 3);
    assert_eq!(record.delivered, 1);

    // Exactly one digest payload, ranked alpha > beta > gamma.
    let payloads = sink.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    let rendered = &payloads[0];
    let pos = |s: &str| rendered.find(s).unwrap();
    assert!(pos("author_18") < pos("author_19"));
    assert!(pos("author_19") < pos("author_20"));
    assert!(!rendered.contains("author_13"));
    drop(payloads);

    // All 20 seen ids are committed, not just the 3 notified.
    let dedupe = Deduplicator::load(state.path(), 14).unwrap();
    assert_eq!(dedupe.len(), 20);
    for i in 1..=20 {
        assert!(dedupe.contains(&format!("t{i:02}")));
    }

    let ledger = RunLedger::new(state.path()).read_all().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].qualified, 3);
}

#[tokio::test]
async fn second_run_over_same_window_is_a_clean_noop() {
    let server = mock_list_server(window_of_20()).await;
    let state = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let runner = runner_with(
        test_config(state.path(), server.uri()),
        vec![Box::new(sink.clone())],
    );

    let first = runner.run_once().await.unwrap();
    assert_eq!(first.status, RunStatus::Done);

    let second = runner.run_once().await.unwrap();
    assert_eq!(second.status, RunStatus::Done);
    assert_eq!(second.fetched, 20);
    assert_eq!(second.new, 0);
    assert_eq!(second.delivered, 0);

    // No second notification.
    assert_eq!(sink.payloads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn retry_exhausted_item_is_excluded_but_still_committed() {
    let body = json!({ "tweets": [
        tweet(1, "alpha: relevant and healthy", 40, 2),
        tweet(2, "flaky: oracle keeps timing out", 99, 5),
    ]});
    let server = mock_list_server(body).await;
    let state = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let runner = runner_with(
        test_config(state.path(), server.uri()),
        vec![Box::new(sink.clone())],
    );

    let record = runner.run_once().await.unwrap();

    assert_eq!(record.status, RunStatus::DoneDegraded);
    assert_eq!(record.engaged, 2);
    assert_eq!(record.scored, 1);
    assert_eq!(record.qualified, 1);

    let payloads = sink.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);
    assert!(!payloads[0].contains("author_02"));
    drop(payloads);

    // The unscorable item is still marked seen, so it cannot loop forever.
    let dedupe = Deduplicator::load(state.path(), 14).unwrap();
    assert!(dedupe.contains("t01"));
    assert!(dedupe.contains("t02"));
}

#[tokio::test]
async fn all_sinks_failing_aborts_before_commit() {
    let server = mock_list_server(window_of_20()).await;
    let state = tempfile::tempdir().unwrap();
    let runner = runner_with(
        test_config(state.path(), server.uri()),
        vec![Box::new(FailingSink)],
    );

    let record = runner.run_once().await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error.is_some());

    // Nothing committed; the next scheduled run re-attempts the same items.
    let dedupe = Deduplicator::load(state.path(), 14).unwrap();
    assert!(dedupe.is_empty());
}

#[tokio::test]
async fn partial_sink_failure_still_commits_and_degrades() {
    let server = mock_list_server(window_of_20()).await;
    let state = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let runner = runner_with(
        test_config(state.path(), server.uri()),
        vec![Box::new(FailingSink), Box::new(sink.clone())],
    );

    let record = runner.run_once().await.unwrap();
    assert_eq!(record.status, RunStatus::DoneDegraded);
    assert_eq!(record.delivered, 1);
    assert_eq!(sink.payloads.lock().unwrap().len(), 1);

    let dedupe = Deduplicator::load(state.path(), 14).unwrap();
    assert_eq!(dedupe.len(), 20);
}

#[tokio::test]
async fn cancellation_before_scoring_commits_nothing() {
    let server = mock_list_server(window_of_20()).await;
    let state = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let runner = runner_with(
        test_config(state.path(), server.uri()),
        vec![Box::new(sink.clone())],
    );

    runner.cancellation_token().cancel();
    let record = runner.run_once().await.unwrap();

    assert_eq!(record.status, RunStatus::Cancelled);
    assert!(sink.payloads.lock().unwrap().is_empty());
    let dedupe = Deduplicator::load(state.path(), 14).unwrap();
    assert!(dedupe.is_empty());
}

#[tokio::test]
async fn cancellation_during_scoring_stops_before_notifying() {
    let server = mock_list_server(window_of_20()).await;
    let state = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let config = test_config(state.path(), server.uri());

    let source = SourceClient::new(
        config.source_base_url.clone().unwrap(),
        "test-bearer".to_string(),
        Duration::from_secs(5),
    )
    .unwrap();
    let provider = CancellingProvider::default();
    let oracle = RelevanceOracle::new(
        Arc::new(provider.clone()),
        config.profile.clone(),
        config.max_attempts,
        Duration::from_millis(config.backoff_base_ms),
        config.oracle_workers,
    );
    let runner = PipelineRunner::new(config, source, oracle, vec![Box::new(sink.clone())]);
    *provider.token.lock().unwrap() = Some(runner.cancellation_token());

    let record = runner.run_once().await.unwrap();

    assert_eq!(record.status, RunStatus::Cancelled);
    // The in-flight scoring pool drained, but nothing went further.
    assert!(record.scored > 0);
    assert!(sink.payloads.lock().unwrap().is_empty());
    let dedupe = Deduplicator::load(state.path(), 14).unwrap();
    assert!(dedupe.is_empty());
}

#[tokio::test]
async fn fatal_fetch_error_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/twitter/list/list-1/tweets"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let state = tempfile::tempdir().unwrap();
    let runner = runner_with(test_config(state.path(), server.uri()), Vec::new());

    let record = runner.run_once().await.unwrap();
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error.unwrap().contains("401"));
}
