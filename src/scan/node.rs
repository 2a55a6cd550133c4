//! Size tree produced by a scan.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Directory,
    /// A symbolic link reported as a zero-size leaf (never followed unless asked to).
    Link,
}

/// One directory (or link) of the scanned tree.
///
/// Regular files are not nodes: their sizes are folded into the parent's `own_bytes`.
/// `size_bytes == own_bytes + sum(children.size_bytes)` holds for every node.
#[derive(Debug, Clone, Serialize)]
pub struct PathNode {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Bytes of regular files directly inside this directory (whole subtree when `collapsed`).
    pub own_bytes: u64,
    /// Regular files in the whole subtree.
    pub file_count: u64,
    /// Newest modification time seen in the subtree.
    pub last_modified: Option<DateTime<Utc>>,
    pub kind: NodeKind,
    /// The directory could not be listed; its size is recorded as 0.
    pub inaccessible: bool,
    /// The whole subtree was visited (false when a scan was cancelled part way).
    pub complete: bool,
    /// The subtree overlaps an in-flight relocation; its sizes are meaningless.
    pub stale: bool,
    /// Beyond the depth limit: sizes cover the whole subtree but `children` is empty.
    pub collapsed: bool,
    pub children: Vec<PathNode>,
    /// This directory's own listing finished (children may still be incomplete).
    #[serde(skip)]
    pub(crate) listed: bool,
}

impl PathNode {
    pub(crate) fn directory(path: PathBuf) -> Self {
        Self {
            path,
            size_bytes: 0,
            own_bytes: 0,
            file_count: 0,
            last_modified: None,
            kind: NodeKind::Directory,
            inaccessible: false,
            complete: false,
            stale: false,
            collapsed: false,
            children: Vec::new(),
            listed: false,
        }
    }

    pub(crate) fn link(path: PathBuf) -> Self {
        Self {
            kind: NodeKind::Link,
            complete: true,
            listed: true,
            ..Self::directory(path)
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub(crate) fn touch(&mut self, t: Option<SystemTime>) {
        if let Some(t) = t.map(DateTime::<Utc>::from) {
            if self.last_modified.is_none_or(|cur| t > cur) {
                self.last_modified = Some(t);
            }
        }
    }

    /// Recompute `size_bytes`, `file_count`, `last_modified` and `complete` from
    /// `own_bytes` and the children. Children are aggregated already.
    pub(crate) fn aggregate(&mut self, own_files: u64) {
        self.size_bytes = self.own_bytes;
        self.file_count = own_files;
        let mut complete = self.listed;
        let mut newest = self.last_modified;
        for c in &self.children {
            self.size_bytes = self.size_bytes.saturating_add(c.size_bytes);
            self.file_count += c.file_count;
            complete &= c.complete;
            if c.last_modified > newest {
                newest = c.last_modified;
            }
        }
        self.last_modified = newest;
        self.complete = complete;
    }

    /// Incomplete, stale, or above a node that is.
    pub(crate) fn needs_rescan(&self) -> bool {
        self.is_directory()
            && (!self.complete || self.stale || self.children.iter().any(PathNode::needs_rescan))
    }

    /// Regular files directly inside this node (subtree for collapsed nodes).
    pub(crate) fn own_files(&self) -> u64 {
        self.file_count - self.children.iter().map(|c| c.file_count).sum::<u64>()
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn iter(&self) -> impl Iterator<Item = &PathNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let n = stack.pop()?;
            stack.extend(n.children.iter().rev());
            Some(n)
        })
    }

    /// Look up a descendant (or self) by path.
    pub fn find(&self, path: &Path) -> Option<&PathNode> {
        if self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|c| c.find(path))
    }

    pub fn summary(&self) -> NodeSummary {
        NodeSummary {
            path: self.path.clone(),
            size_bytes: self.size_bytes,
            file_count: self.file_count,
            last_modified: self.last_modified,
            is_directory: self.is_directory(),
            inaccessible: self.inaccessible,
        }
    }
}

/// Flat, child-less view of a node carried by ranking results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub file_count: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_directory: bool,
    pub inaccessible: bool,
}


#[cfg(test)]
mod tests {
    use super::test_support::dir;
    use super::*;

    #[test]
    fn aggregate_sums_children_and_own_bytes() {
        let root = dir("/r", 5, vec![dir("/r/a", 100, vec![dir("/r/a/x", 7, vec![])]), dir("/r/b", 3, vec![])]);
        assert_eq!(root.size_bytes, 115);
        assert_eq!(root.file_count, 4);
        assert!(root.complete);
        for n in root.iter() {
            let kids: u64 = n.children.iter().map(|c| c.size_bytes).sum();
            assert_eq!(kids + n.own_bytes, n.size_bytes);
        }
    }

    #[test]
    fn incomplete_child_marks_parent_incomplete() {
        let mut child = PathNode::directory(PathBuf::from("/r/a"));
        child.aggregate(0);
        let root = dir("/r", 0, vec![child]);
        assert!(!root.complete);
    }

    #[test]
    fn preorder_iteration_and_find() {
        let root = dir("/r", 0, vec![dir("/r/a", 1, vec![dir("/r/a/x", 1, vec![])]), dir("/r/b", 1, vec![])]);
        let order: Vec<_> = root.iter().map(|n| n.path.display().to_string()).collect();
        assert_eq!(order, ["/r", "/r/a", "/r/a/x", "/r/b"]);
        assert_eq!(root.find(Path::new("/r/a/x")).unwrap().size_bytes, 1);
        assert!(root.find(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn links_are_complete_zero_size_leaves() {
        let l = PathNode::link(PathBuf::from("/r/l"));
        assert_eq!(l.size_bytes, 0);
        assert!(l.complete);
        assert!(!l.is_directory());
    }
}
