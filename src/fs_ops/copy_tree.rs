//! Staged tree copy used by the relocation engine.
//!
//! Directories and links are created in a single pre-order walk; regular files are then
//! copied in parallel on the rayon pool. Every chunk of every file is a checkpoint for
//! cancellation and stall detection. Directory metadata is applied last, deepest first,
//! so setting a directory's mtime is not undone by creating its children.

use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::helpers::describe_io;
use super::io_copy::{DurabilityMode, copy_file_chunked};
use super::metadata::{preserve_metadata, preserve_xattrs};
use super::tally::special_kind;
use crate::shutdown::CancelToken;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CopyError {
    #[error("copy cancelled")]
    Cancelled,
    #[error("no copy progress for {}s", .0.as_secs())]
    Stalled(Duration),
    #[error("{message}")]
    Io { path: PathBuf, message: String },
}

impl CopyError {
    fn io(op: &str, path: &Path, e: &io::Error) -> Self {
        CopyError::Io {
            path: path.to_path_buf(),
            message: describe_io(op, path, e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CopyOptions {
    pub cancel: CancelToken,
    pub stall_timeout: Duration,
    pub preserve_metadata: bool,
    pub durability: DurabilityMode,
}

/// Live copy counters shared between the copying threads and status readers.
#[derive(Debug)]
pub struct CopyProgress {
    bytes: AtomicU64,
    last: Mutex<Instant>,
}

impl Default for CopyProgress {
    fn default() -> Self {
        Self {
            bytes: AtomicU64::new(0),
            last: Mutex::new(Instant::now()),
        }
    }
}

impl CopyProgress {
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Time since any copying thread last made progress.
    pub fn idle(&self) -> Duration {
        self.last.lock().elapsed()
    }

    fn advance(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
        *self.last.lock() = Instant::now();
    }
}

fn abort_reason(opts: &CopyOptions, progress: &CopyProgress) -> Option<CopyError> {
    if opts.cancel.is_cancelled() {
        return Some(CopyError::Cancelled);
    }
    let idle = progress.idle();
    (idle > opts.stall_timeout).then_some(CopyError::Stalled(idle))
}

fn checkpoint(opts: &CopyOptions, progress: &CopyProgress) -> Result<(), CopyError> {
    match abort_reason(opts, progress) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Copy the tree at `src` into the new directory `dst` (which must not exist).
/// Returns the number of file bytes written. On error the partially written `dst`
/// is left for the caller to remove.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    opts: &CopyOptions,
    progress: &CopyProgress,
) -> Result<u64, CopyError> {
    progress.advance(0);
    let root_meta = fs::metadata(src).map_err(|e| CopyError::io("stat source", src, &e))?;
    fs::create_dir(dst).map_err(|e| CopyError::io("create staging directory", dst, &e))?;

    let mut dirs: Vec<(PathBuf, fs::Metadata)> = vec![(dst.to_path_buf(), root_meta)];
    let mut files: Vec<(PathBuf, PathBuf)> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        checkpoint(opts, progress)?;
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            CopyError::Io {
                message: format!("read source tree '{}': {e}", path.display()),
                path,
            }
        })?;
        let rel = entry.path().strip_prefix(src).map_err(|e| CopyError::Io {
            path: entry.path().to_path_buf(),
            message: e.to_string(),
        })?;
        let target = dst.join(rel);
        let ft = entry.file_type();
        if ft.is_symlink() {
            copy_link(entry.path(), &target)?;
        } else if ft.is_dir() {
            fs::create_dir(&target).map_err(|e| CopyError::io("create directory", &target, &e))?;
            if opts.preserve_metadata {
                let meta = entry.metadata().map_err(|e| CopyError::Io {
                    path: entry.path().to_path_buf(),
                    message: e.to_string(),
                })?;
                dirs.push((target, meta));
            }
        } else if let Some(kind) = special_kind(&ft) {
            return Err(CopyError::Io {
                message: format!("'{}' is a {kind}; special files are not copied", entry.path().display()),
                path: entry.into_path(),
            });
        } else {
            files.push((entry.into_path(), target));
        }
        progress.advance(0);
    }
    debug!(src = %src.display(), files = files.len(), dirs = dirs.len(), "tree skeleton created; copying files");

    let bytes = files
        .par_iter()
        .map(|(from, to)| copy_one(from, to, opts, progress))
        .try_reduce(|| 0u64, |a, b| Ok(a + b))?;

    if opts.preserve_metadata {
        for (dir, meta) in dirs.iter().rev() {
            preserve_metadata(dir, meta);
        }
    }
    Ok(bytes)
}

fn copy_one(
    from: &Path,
    to: &Path,
    opts: &CopyOptions,
    progress: &CopyProgress,
) -> Result<u64, CopyError> {
    checkpoint(opts, progress)?;
    let mut reason: Option<CopyError> = None;
    let res = copy_file_chunked(from, to, opts.durability, &mut |n| {
        if let Some(r) = abort_reason(opts, progress) {
            reason = Some(r);
            return Err(io::Error::new(io::ErrorKind::Interrupted, "copy aborted"));
        }
        progress.advance(n);
        Ok(())
    });
    let bytes = match res {
        Ok(b) => b,
        Err(e) => return Err(reason.unwrap_or_else(|| CopyError::io("copy file", to, &e))),
    };
    if opts.preserve_metadata {
        if let Ok(meta) = fs::metadata(from) {
            preserve_metadata(to, &meta);
        }
        preserve_xattrs(from, to);
    }
    trace!(file = %to.display(), bytes, "file staged");
    Ok(bytes)
}

/// Recreate the link at `from` as `to`, pointing at the same (unresolved) target.
fn copy_link(from: &Path, to: &Path) -> Result<(), CopyError> {
    let target = fs::read_link(from).map_err(|e| CopyError::io("read link", from, &e))?;
    #[cfg(unix)]
    let res = std::os::unix::fs::symlink(&target, to);
    #[cfg(windows)]
    let res = if fs::metadata(from).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(&target, to)
    } else {
        std::os::windows::fs::symlink_file(&target, to)
    };
    res.map_err(|e| CopyError::io("recreate link", to, &e))
}
