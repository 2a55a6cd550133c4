//! Size index: recursive per-directory size aggregation.
//!
//! `scan` never writes to disk. Errors below the root are absorbed into the tree
//! (`inaccessible` nodes plus a [`ScanIssue`] each); only a root that cannot be scanned
//! at all fails the call. A cancelled scan still returns its tree: fully visited
//! subtrees are valid, unfinished ones are marked `complete == false` and can be
//! finished later with [`SizeIndex::resume`].

mod node;
mod walk;

pub use node::{NodeKind, NodeSummary, PathNode};
#[cfg(test)]
pub(crate) use node::test_support;

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::engine::JobRegistry;
use crate::errors::ScanError;
use crate::shutdown::CancelToken;
use walk::Walker;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Descend into linked directories (cycles are detected and reported as links).
    pub follow_symlinks: bool,
    /// Directories at this depth (root = 0) become collapsed leaves.
    pub max_depth: Option<usize>,
    /// Worker threads for sibling directories; 0 = one per CPU.
    pub threads: usize,
    pub cancel: CancelToken,
    /// In-flight relocations; overlapping subtrees are flagged stale instead of sized.
    pub busy: Option<JobRegistry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    Complete,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PermissionDenied,
    Io,
}

/// A subtree error absorbed by the scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub message: String,
}

/// Result of a scan: the size tree and what happened while building it.
#[derive(Debug, Clone, Serialize)]
pub struct SizeIndex {
    pub root: PathNode,
    pub outcome: ScanOutcome,
    pub issues: Vec<ScanIssue>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl SizeIndex {
    pub fn total_bytes(&self) -> u64 {
        self.root.size_bytes
    }

    pub fn node_count(&self) -> usize {
        self.root.iter().count()
    }

    pub fn is_complete(&self) -> bool {
        self.outcome == ScanOutcome::Complete
    }

    pub fn find(&self, path: &Path) -> Option<&PathNode> {
        self.root.find(path)
    }

    /// Finish subtrees left incomplete by cancellation (or stale because a relocation
    /// was running), reusing every subtree that is already complete.
    pub fn resume(&mut self, options: &ScanOptions) -> Result<(), ScanError> {
        let started = Instant::now();
        let pool = build_pool(options.threads)?;
        let walker = Walker::new(options);
        pool.install(|| walker.resume(&mut self.root, 0));
        self.issues.extend(walker.issues.into_inner());
        self.outcome = outcome_of(&self.root);
        self.elapsed += started.elapsed();
        info!(root = %self.root.path.display(), outcome = ?self.outcome, size = self.root.size_bytes, "scan resumed");
        Ok(())
    }
}

fn outcome_of(root: &PathNode) -> ScanOutcome {
    if root.complete {
        ScanOutcome::Complete
    } else {
        ScanOutcome::Cancelled
    }
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool, ScanError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("cleanshift-scan-{i}"))
        .build()
        .map_err(|e| ScanError::Pool(e.to_string()))
}

fn root_error(root: &Path, e: io::Error) -> ScanError {
    match e.kind() {
        io::ErrorKind::NotFound => ScanError::PathNotFound(root.to_path_buf()),
        io::ErrorKind::PermissionDenied => ScanError::PermissionDenied(root.to_path_buf()),
        io::ErrorKind::NotADirectory => ScanError::NotADirectory(root.to_path_buf()),
        _ => ScanError::Unreadable {
            path: root.to_path_buf(),
            reason: e.to_string(),
        },
    }
}

/// Scan `root` and build its size tree.
pub fn scan(root: &Path, options: &ScanOptions) -> Result<SizeIndex, ScanError> {
    let started = Instant::now();
    let meta = fs::metadata(root).map_err(|e| root_error(root, e))?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(|e| root_error(root, e))?;
    if options.cancel.is_cancelled() {
        return Err(ScanError::Cancelled(root.to_path_buf()));
    }
    let root = dunce::canonicalize(root).map_err(|e| root_error(root, e))?;

    let pool = build_pool(options.threads)?;
    let walker = Walker::new(options);
    let tree = pool.install(|| walker.visit(root.clone(), 0, &[]));
    let issues = walker.issues.into_inner();
    let outcome = outcome_of(&tree);
    let elapsed = started.elapsed();

    if outcome == ScanOutcome::Cancelled {
        warn!(root = %root.display(), "scan cancelled; returning partial tree");
    }
    info!(
        root = %root.display(),
        size = tree.size_bytes,
        files = tree.file_count,
        issues = issues.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "scan finished"
    );
    Ok(SizeIndex {
        root: tree,
        outcome,
        issues,
        elapsed,
    })
}
