// src/fetch.rs
use anyhow::Context;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::time::Duration;

use crate::error::FetchError;
use crate::model::Item;

pub const DEFAULT_BASE_URL: &str = "https://api.socialdata.tools";

/// One page of upstream results. `next_cursor` is threaded through when the
/// upstream offers it; the runner fetches a single recent window per pass
/// and lets the deduplicator absorb overlap.
#[derive(Debug)]
pub struct FetchPage {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
}

/// Read-only client for the list endpoint. Never touches persisted state.
#[derive(Clone)]
pub struct SourceClient {
    http: reqwest::Client,
    base_url: String,
    bearer: String,
}

impl SourceClient {
    /// Fails if the HTTP client cannot be built; a client without the
    /// configured timeout must never be substituted silently.
    pub fn new(
        base_url: impl Into<String>,
        bearer: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("listsift/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building list client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            bearer,
        })
    }

    pub async fn fetch(
        &self,
        list_id: &str,
        since_cursor: Option<&str>,
    ) -> Result<FetchPage, FetchError> {
        let url = format!(
            "{}/twitter/list/{}/tweets",
            self.base_url.trim_end_matches('/'),
            list_id
        );

        let mut req = self.http.get(&url).bearer_auth(&self.bearer);
        if let Some(cursor) = since_cursor {
            req = req.query(&[("cursor", cursor)]);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                FetchError::Transient(format!("list request: {e}"))
            } else {
                FetchError::Fatal(format!("list request: {e}"))
            }
        })?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(FetchError::Transient(format!("list endpoint: HTTP {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Fatal(format!("list endpoint: HTTP {status}")));
        }

        // The client timeout covers body streaming too; a stall mid-body
        // surfaces here and is still transient, not a malformed response.
        let body: ListResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Transient(format!("list body: {e}"))
            } else {
                FetchError::Fatal(format!("list body: {e}"))
            }
        })?;

        let items: Vec<Item> = body.tweets.into_iter().filter_map(Item::from_wire).collect();
        metrics::counter!("fetch_items_total").increment(items.len() as u64);
        tracing::debug!(count = items.len(), list_id, "fetched list window");

        Ok(FetchPage {
            items,
            next_cursor: body.next_cursor,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    tweets: Vec<WireTweet>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTweet {
    id_str: String,
    full_text: String,
    #[serde(default)]
    favorite_count: u64,
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    tweet_created_at: Option<String>,
    user: WireUser,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    screen_name: String,
}

impl Item {
    fn from_wire(w: WireTweet) -> Option<Self> {
        let text = normalize_text(&w.full_text);
        if w.id_str.is_empty() || text.is_empty() {
            return None;
        }
        let url = format!("https://twitter.com/{}/status/{}", w.user.screen_name, w.id_str);
        Some(Item {
            id: w.id_str,
            author: w.user.screen_name,
            text,
            likes: w.favorite_count,
            reshares: w.retweet_count,
            created_at: w
                .tweet_created_at
                .as_deref()
                .map(parse_timestamp)
                .unwrap_or(DateTime::UNIX_EPOCH),
            url,
        })
    }
}

/// Lenient timestamp parse; unparseable dates sort as oldest rather than
/// failing the whole window.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Normalize post text: decode HTML entities, collapse whitespace, trim.
/// Upstream bodies carry `&amp;`-style entities and hard newlines.
pub fn normalize_text(s: &str) -> String {
    let out = html_escape::decode_html_entities(s).to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}
