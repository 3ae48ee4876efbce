// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Upstream list fetch failures, split by whether a retry can help.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network trouble, timeouts, rate limits, 5xx. Safe to retry.
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// Auth problems and other non-retryable 4xx responses.
    #[error("fatal fetch failure: {0}")]
    Fatal(String),
}

/// Judgment oracle failures.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Remote call failed or timed out. Retried with backoff.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// Response came back but no score could be parsed from its head.
    /// Not retried; the item is dropped from the digest and logged.
    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

/// Per-sink delivery failure. One sink failing never blocks its siblings.
#[derive(Debug, Error)]
#[error("{sink} delivery failed: {message}")]
pub struct SinkError {
    pub sink: &'static str,
    pub message: String,
}

/// Persisted-state failures. `Corrupt` is fatal: a run must not guess at
/// dedupe history, or it risks double-notifying.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("state io error: {0}")]
    Io(#[from] std::io::Error),
}
