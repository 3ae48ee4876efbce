// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod config;
pub mod dedupe;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod ledger;
pub mod model;
pub mod notify;
pub mod oracle;
pub mod runner;

// ---- Re-exports for stable public API ----
pub use crate::config::Config;
pub use crate::model::{Digest, Item, RunRecord, RunStatus, ScoredItem};
pub use crate::notify::{DeliveryResult, DigestSink};
pub use crate::oracle::{JudgmentProvider, RelevanceOracle};
pub use crate::runner::PipelineRunner;
