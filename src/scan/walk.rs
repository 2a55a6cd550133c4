//! Recursive, parallel size aggregation.
//!
//! Each directory is listed once; its direct files are summed into `own_bytes` and its
//! subdirectories are visited in parallel on the scan's bounded rayon pool. A parent's
//! totals are computed only after all of its children have returned.

use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::{IssueKind, ScanIssue, ScanOptions};
use super::node::PathNode;

/// Bytes a file occupies: its length, capped by the allocated blocks so sparse files
/// are not overstated.
#[cfg(unix)]
fn on_disk_bytes(m: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    m.len().min(m.blocks().saturating_mul(512))
}

#[cfg(not(unix))]
fn on_disk_bytes(m: &fs::Metadata) -> u64 {
    m.len()
}

pub(super) struct Walker<'a> {
    pub(super) opts: &'a ScanOptions,
    pub(super) issues: Mutex<Vec<ScanIssue>>,
}

impl<'a> Walker<'a> {
    pub(super) fn new(opts: &'a ScanOptions) -> Self {
        Self {
            opts,
            issues: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, path: &Path, e: &io::Error) {
        let kind = if e.kind() == io::ErrorKind::PermissionDenied {
            IssueKind::PermissionDenied
        } else {
            IssueKind::Io
        };
        debug!(path = %path.display(), error = %e, "subtree unreadable; recorded as inaccessible");
        self.issues.lock().push(ScanIssue {
            path: path.to_path_buf(),
            kind,
            message: e.to_string(),
        });
    }

    /// Visit one directory. `chain` holds the canonical paths of the directories above
    /// it and is only maintained when links are followed (cycle detection).
    pub(super) fn visit(&self, path: PathBuf, depth: usize, chain: &[PathBuf]) -> PathNode {
        let mut node = PathNode::directory(path);
        if self.opts.cancel.is_cancelled() {
            return node;
        }
        if let Some(job) = self.opts.busy.as_ref().and_then(|r| r.busy_with(&node.path)) {
            debug!(path = %node.path.display(), job, "subtree is being relocated; flagged stale");
            node.stale = true;
            node.listed = true;
            node.complete = true;
            return node;
        }
        if self.opts.max_depth.is_some_and(|max| depth >= max) {
            self.collapse(&mut node);
            return node;
        }

        let listing = match fs::read_dir(&node.path) {
            Ok(l) => l,
            Err(e) => {
                self.record(&node.path, &e);
                node.inaccessible = true;
                node.listed = true;
                node.aggregate(0);
                return node;
            }
        };
        if let Ok(m) = fs::metadata(&node.path) {
            node.touch(m.modified().ok());
        }

        let mut own_files = 0u64;
        let mut subdirs: Vec<PathBuf> = Vec::new();
        let mut listed = true;
        for entry in listing {
            if self.opts.cancel.is_cancelled() {
                listed = false;
                break;
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    self.record(&node.path, &e);
                    continue;
                }
            };
            let p = entry.path();
            let ft = match entry.file_type() {
                Ok(ft) => ft,
                Err(e) => {
                    self.record(&p, &e);
                    continue;
                }
            };
            if ft.is_symlink() {
                if self.should_follow(&p, chain) {
                    subdirs.push(p);
                } else {
                    node.children.push(PathNode::link(p));
                }
            } else if ft.is_dir() {
                subdirs.push(p);
            } else {
                match entry.metadata() {
                    Ok(m) => {
                        node.own_bytes = node.own_bytes.saturating_add(on_disk_bytes(&m));
                        own_files += 1;
                        node.touch(m.modified().ok());
                    }
                    Err(e) => self.record(&p, &e),
                }
            }
        }
        node.listed = listed;

        let child_chain = self.extend_chain(chain, &node.path);
        let visited: Vec<PathNode> = subdirs
            .into_par_iter()
            .map(|p| self.visit(p, depth + 1, &child_chain))
            .collect();
        node.children.extend(visited);
        node.children.sort_by(|a, b| a.path.cmp(&b.path));
        node.aggregate(own_files);
        trace!(path = %node.path.display(), size = node.size_bytes, "directory aggregated");
        node
    }

    /// Re-visit what a cancelled or stale-flagged scan left unfinished, keeping
    /// every subtree that was already complete.
    pub(super) fn resume(&self, node: &mut PathNode, depth: usize) {
        if !node.needs_rescan() {
            return;
        }
        if node.stale || !node.listed {
            let chain = self.chain_for(&node.path);
            *node = self.visit(node.path.clone(), depth, &chain);
            return;
        }
        let own_files = node.own_files();
        node.children
            .par_iter_mut()
            .for_each(|c| self.resume(c, depth + 1));
        node.aggregate(own_files);
    }

    /// Collapsed leaf: sum the whole subtree without building nodes for it.
    fn collapse(&self, node: &mut PathNode) {
        node.collapsed = true;
        let mut files = 0u64;
        let mut listed = true;
        for entry in WalkDir::new(&node.path).follow_links(self.opts.follow_symlinks) {
            if self.opts.cancel.is_cancelled() {
                listed = false;
                break;
            }
            match entry {
                Ok(e) if e.file_type().is_file() => {
                    if let Ok(m) = e.metadata() {
                        node.own_bytes = node.own_bytes.saturating_add(on_disk_bytes(&m));
                        files += 1;
                        node.touch(m.modified().ok());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().unwrap_or(&node.path).to_path_buf();
                    let io = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop"));
                    if path == node.path {
                        node.inaccessible = true;
                    }
                    self.record(&path, &io);
                }
            }
        }
        node.listed = listed;
        if !listed {
            // A partial sum would understate the subtree; keep nothing.
            node.own_bytes = 0;
            files = 0;
        }
        node.aggregate(files);
    }

    fn should_follow(&self, link: &Path, chain: &[PathBuf]) -> bool {
        if !self.opts.follow_symlinks {
            return false;
        }
        match dunce::canonicalize(link) {
            Ok(target) => target.is_dir() && !chain.contains(&target),
            Err(_) => false,
        }
    }

    fn extend_chain(&self, chain: &[PathBuf], dir: &Path) -> Vec<PathBuf> {
        if !self.opts.follow_symlinks {
            return Vec::new();
        }
        let mut next = chain.to_vec();
        next.push(dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));
        next
    }

    fn chain_for(&self, dir: &Path) -> Vec<PathBuf> {
        if !self.opts.follow_symlinks {
            return Vec::new();
        }
        let mut chain: Vec<PathBuf> = dir
            .ancestors()
            .skip(1)
            .filter_map(|a| dunce::canonicalize(a).ok())
            .collect();
        chain.reverse();
        chain
    }
}
