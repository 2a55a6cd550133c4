//! Append-only move result log (one JSON object per line).
//!
//! Every terminal job, successful or not, is recorded so higher layers can audit
//! relocations or undo them by reference. Appends take an exclusive `fs2` lock so
//! concurrent processes never interleave lines.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::job::{Inconsistency, JobId, MoveJob, MoveState};
use crate::platform::open_log_file_secure_append;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub job_id: JobId,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub final_state: MoveState,
    pub timestamp: DateTime<Utc>,
    pub bytes_moved: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inconsistency: Option<Inconsistency>,
}

impl ResultEntry {
    pub fn from_job(job: &MoveJob) -> Self {
        Self {
            job_id: job.id,
            source_path: job.source_path.clone(),
            target_path: job.target_path.clone(),
            final_state: job.state,
            timestamp: job.completed_at.unwrap_or_else(Utc::now),
            bytes_moved: if job.state == MoveState::Completed {
                job.expected.map(|t| t.bytes).unwrap_or(job.bytes_copied)
            } else {
                0
            },
            error_detail: job.error.as_ref().map(|e| e.to_string()),
            inconsistency: job.inconsistency.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultLog {
    path: PathBuf,
}

impl ResultLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &ResultEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("serialise result entry")?;
        line.push('\n');
        let mut f = open_log_file_secure_append(&self.path)
            .with_context(|| format!("open result log '{}'", self.path.display()))?;
        f.lock_exclusive()
            .with_context(|| format!("lock result log '{}'", self.path.display()))?;
        let res = f.write_all(line.as_bytes()).and_then(|_| f.flush());
        let _ = FileExt::unlock(&f);
        res.with_context(|| format!("append to result log '{}'", self.path.display()))
    }

    /// Every well-formed entry, oldest first. Malformed lines are skipped with a warning.
    pub fn read_all(&self) -> Result<Vec<ResultEntry>> {
        let f = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("open result log '{}'", self.path.display()));
            }
        };
        let mut out = Vec::new();
        for (n, line) in BufReader::new(f).lines().enumerate() {
            let line = line.with_context(|| format!("read result log '{}'", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ResultEntry>(&line) {
                Ok(e) => out.push(e),
                Err(e) => warn!(log = %self.path.display(), line = n + 1, error = %e, "skipping malformed result entry"),
            }
        }
        Ok(out)
    }
}
