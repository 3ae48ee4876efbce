// src/oracle.rs
//! Relevance oracle: provider abstraction, score parsing, bounded fan-out.
//!
//! The judgment service is opaque: we hand it the item plus the caller's
//! work profile and expect a response whose head parses as a score out of
//! ten. Everything else here is policy around that call — retries, timeouts,
//! and keeping one item's failure away from its siblings.

use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::OracleError;
use crate::model::{Item, ScoredItem};

/// Low-level provider: performs one remote judgment call. Separated from the
/// retry/fan-out policy so tests can script responses.
#[async_trait]
pub trait JudgmentProvider: Send + Sync + 'static {
    async fn judge(&self, prompt: &str) -> Result<String, OracleError>;
    fn name(&self) -> &'static str;
}

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// OpenAI chat-completions provider. Requires an API key.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Fails if the HTTP client cannot be built; a client without the
    /// configured timeout must never be substituted silently.
    pub fn new(api_key: String, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("listsift/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building oracle client")?;
        Ok(Self {
            http,
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Override the API host; for tests against a local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

const SYSTEM_PROMPT: &str =
    "You evaluate content relevance for busy professionals. Reply with the numerical \
     score on the first line (e.g. \"Score: 8/10\"), then a brief explanation.";

#[async_trait]
impl JudgmentProvider for OpenAiProvider {
    async fn judge(&self, prompt: &str) -> Result<String, OracleError> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
            max_tokens: 200,
        };

        let resp = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| OracleError::Unavailable(format!("chat completions: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OracleError::Unavailable(format!(
                "chat completions: HTTP {status}"
            )));
        }

        // A timeout firing during body read is transient and retryable;
        // only a genuinely undecodable body is malformed.
        let body: ChatResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Unavailable(format!("chat completions body: {e}"))
            } else {
                OracleError::Malformed(format!("chat completions body: {e}"))
            }
        })?;
        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| OracleError::Malformed("empty completion".to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Deterministic provider for tests and dry runs.
pub struct FixedProvider {
    pub reply: String,
}

#[async_trait]
impl JudgmentProvider for FixedProvider {
    async fn judge(&self, _prompt: &str) -> Result<String, OracleError> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Parse a relevance score from the head of an oracle response.
///
/// Accepts `Score: 8/10`, `8/10`, or a bare leading integer on the first
/// non-empty line. Anything else (or a value above 10) is a malformed
/// response, surfaced rather than silently defaulted.
pub fn parse_score(response: &str) -> Option<u8> {
    let head = response.lines().find(|l| !l.trim().is_empty())?;

    static RE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"(?i)^\s*(?:score\s*[:\-]?\s*)?(\d{1,2})\s*(?:/\s*10)?\b").unwrap()
    });

    let caps = re.captures(head)?;
    let value: u8 = caps.get(1)?.as_str().parse().ok()?;
    (value <= 10).then_some(value)
}

/// Results of scoring one batch. Order is not meaningful; the digest builder
/// restores determinism by ranking.
#[derive(Debug, Default)]
pub struct ScoreBatch {
    pub scored: Vec<ScoredItem>,
    /// (item id, error) for items the oracle could not score.
    pub failures: Vec<(String, OracleError)>,
}

/// Retry and fan-out policy around a [`JudgmentProvider`].
#[derive(Clone)]
pub struct RelevanceOracle {
    provider: Arc<dyn JudgmentProvider>,
    profile: String,
    max_attempts: u32,
    backoff_base: Duration,
    workers: usize,
}

impl RelevanceOracle {
    pub fn new(
        provider: Arc<dyn JudgmentProvider>,
        profile: String,
        max_attempts: u32,
        backoff_base: Duration,
        workers: usize,
    ) -> Self {
        Self {
            provider,
            profile,
            max_attempts: max_attempts.max(1),
            backoff_base,
            workers: workers.max(1),
        }
    }

    fn prompt_for(&self, item: &Item) -> String {
        format!(
            "Analyze if the following post is highly relevant to my work:\n\n\
             POST: \"{}\"\nBy: @{}\nEngagement: Likes: {}, Reshares: {}\n\n\
             MY WORK INTERESTS:\n{}\n\n\
             Rate this post's relevance to my work on a scale of 1-10, where:\n\
             1-3: Not relevant\n4-6: Somewhat relevant\n7-10: Highly relevant\n\n\
             First provide the numerical score, then a brief explanation.",
            item.text, item.author, item.likes, item.reshares, self.profile
        )
    }

    /// Score one item, retrying transient failures with exponential backoff.
    pub async fn score(&self, item: &Item) -> Result<ScoredItem, OracleError> {
        let prompt = self.prompt_for(item);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            metrics::counter!("oracle_calls_total").increment(1);
            match self.provider.judge(&prompt).await {
                Ok(response) => {
                    let Some(score) = parse_score(&response) else {
                        return Err(OracleError::Malformed(format!(
                            "unparseable score head: {:?}",
                            response.lines().next().unwrap_or_default()
                        )));
                    };
                    return Ok(ScoredItem {
                        item: item.clone(),
                        score,
                        rationale: response.trim().to_string(),
                    });
                }
                Err(OracleError::Unavailable(msg)) if attempt < self.max_attempts => {
                    tracing::warn!(
                        item = %item.id,
                        attempt,
                        error = %msg,
                        "oracle transient failure, backing off"
                    );
                    let delay = (self.backoff_base.as_millis() as u64) << (attempt - 1);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Score a batch with bounded parallelism. One item's failure never
    /// aborts its siblings; failures are collected for the run record.
    pub async fn score_all(&self, items: Vec<Item>) -> ScoreBatch {
        let sem = Arc::new(Semaphore::new(self.workers));
        let mut set: JoinSet<(Item, Result<ScoredItem, OracleError>)> = JoinSet::new();

        for item in items {
            let oracle = self.clone();
            let sem = sem.clone();
            set.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        return (
                            item,
                            Err(OracleError::Unavailable("scoring pool closed".to_string())),
                        )
                    }
                };
                let res = oracle.score(&item).await;
                (item, res)
            });
        }

        let mut batch = ScoreBatch::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(scored))) => batch.scored.push(scored),
                Ok((item, Err(e))) => {
                    tracing::warn!(item = %item.id, error = %e, "item excluded from scoring");
                    metrics::counter!("oracle_failures_total").increment(1);
                    batch.failures.push((item.id, e));
                }
                Err(e) => tracing::error!(error = ?e, "scoring task panicked"),
            }
        }
        batch
    }
}
