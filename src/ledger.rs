// src/ledger.rs
//! Append-only run ledger: one JSON line per pipeline pass.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StateError;
use crate::model::RunRecord;

const LEDGER_FILE: &str = "run_ledger.jsonl";

#[derive(Debug, Clone)]
pub struct RunLedger {
    path: PathBuf,
}

impl RunLedger {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(LEDGER_FILE),
        }
    }

    /// Append one record. Every terminal state gets a line, including
    /// `Failed` and `Cancelled`.
    pub fn append(&self, record: &RunRecord) -> Result<(), StateError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let line = serde_json::to_string(record).map_err(|source| StateError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    /// Read the full ledger, oldest first. Mainly for tests and diagnostics.
    pub fn read_all(&self) -> Result<Vec<RunRecord>, StateError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::Io(e)),
        };
        let mut out = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let rec: RunRecord = serde_json::from_str(line).map_err(|source| {
                StateError::Corrupt {
                    path: self.path.clone(),
                    source,
                }
            })?;
            out.push(rec);
        }
        Ok(out)
    }
}
