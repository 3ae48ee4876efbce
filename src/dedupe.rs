// src/dedupe.rs
//! Cross-run dedupe state: which item ids we have already processed.
//!
//! `filter_new` is a pure read; `commit` is the only mutator and runs once
//! per successful pass, so a failed run re-attempts the same items on the
//! next schedule instead of silently dropping them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::model::Item;

const STATE_FILE: &str = "dedupe_state.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    /// item id -> first-seen unix seconds.
    seen: HashMap<String, i64>,
}

#[derive(Debug)]
pub struct Deduplicator {
    path: PathBuf,
    seen: HashMap<String, i64>,
    horizon: Duration,
}

impl Deduplicator {
    /// Load persisted state from `state_dir`. A missing file is an empty
    /// state; an unreadable one is `StateError::Corrupt` and halts the run
    /// rather than risking re-notification.
    pub fn load(state_dir: &Path, horizon_days: i64) -> Result<Self, StateError> {
        let path = state_dir.join(STATE_FILE);
        let seen = match fs::read_to_string(&path) {
            Ok(content) => {
                let parsed: StateFile = serde_json::from_str(&content).map_err(|source| {
                    StateError::Corrupt {
                        path: path.clone(),
                        source,
                    }
                })?;
                parsed.seen
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StateError::Io(e)),
        };
        Ok(Self {
            path,
            seen,
            horizon: Duration::days(horizon_days.max(0)),
        })
    }

    /// Items not yet present in the state. Does not mutate anything.
    pub fn filter_new(&self, items: &[Item]) -> Vec<Item> {
        items
            .iter()
            .filter(|i| !self.seen.contains_key(&i.id))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Mark `items` as seen, evict ids older than the horizon, and persist
    /// atomically. Called exactly once per successful pass, after delivery.
    /// First-seen timestamps are preserved for ids already present.
    pub fn commit(&mut self, items: &[Item], now: DateTime<Utc>) -> Result<(), StateError> {
        let now_secs = now.timestamp();
        for item in items {
            self.seen.entry(item.id.clone()).or_insert(now_secs);
        }

        let cutoff = now_secs - self.horizon.num_seconds();
        let before = self.seen.len();
        self.seen.retain(|_, first_seen| *first_seen >= cutoff);
        let evicted = before - self.seen.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted dedupe ids past horizon");
        }

        self.persist()
    }

    fn persist(&self) -> Result<(), StateError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let state = StateFile {
            seen: self.seen.clone(),
        };
        let json = serde_json::to_string_pretty(&state).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
