//! Candidate ranking.
//!
//! Walks a [`SizeIndex`] top-down. A node below the size threshold is pruned with its
//! whole subtree (no descendant can be larger). The first qualifying node on each
//! branch becomes the candidate and the walk stops there, so no candidate ever
//! contains another. Protected nodes are reported too, flagged ineligible.

mod category;

pub use category::{Category, categorize};

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fs_ops::is_staging_name;
use crate::platform::Platform;
use crate::safety::{Classification, ReasonCode, SafetyPolicy, SafetyVerdict};
use crate::scan::{NodeSummary, PathNode, SizeIndex};
use crate::utils::with_margin;

#[derive(Debug, Clone)]
pub struct RankPolicy {
    pub min_size_bytes: u64,
    /// Volumes considered for `suggested_target`.
    pub target_volumes: Vec<PathBuf>,
    pub space_margin_percent: u32,
}

impl Default for RankPolicy {
    fn default() -> Self {
        Self {
            min_size_bytes: 1024 * 1024 * 1024,
            target_volumes: Vec::new(),
            space_margin_percent: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub node: NodeSummary,
    pub classification: Classification,
    pub reason: String,
    pub verdict: SafetyVerdict,
    pub category: Category,
    pub suggested_target: Option<PathBuf>,
}

impl Candidate {
    /// Protected candidates are shown but can never be selected.
    pub fn is_selectable(&self) -> bool {
        self.classification != Classification::Protected
    }
}

/// Rank the relocation candidates of `index`, largest first (ties by the path's bytes).
pub fn rank(index: &SizeIndex, policy: &RankPolicy, safety: &SafetyPolicy) -> Vec<Candidate> {
    let mut out = Vec::new();
    visit(&index.root, true, policy, safety, &mut out);
    out.sort_by(|a, b| {
        b.node
            .size_bytes
            .cmp(&a.node.size_bytes)
            .then_with(|| a.node.path.as_os_str().cmp(b.node.path.as_os_str()))
    });
    debug!(root = %index.root.path.display(), candidates = out.len(), "ranking finished");
    out
}

fn visit(
    node: &PathNode,
    is_root: bool,
    policy: &RankPolicy,
    safety: &SafetyPolicy,
    out: &mut Vec<Candidate>,
) {
    if node.size_bytes < policy.min_size_bytes || !node.is_directory() || node.stale {
        return;
    }
    // A half-copied tree left by an interrupted move is never offered.
    if node.path.file_name().is_some_and(is_staging_name) {
        return;
    }
    if !is_root && node.complete && !node.inaccessible {
        let verdict = safety.evaluate(&node.path);
        if verdict.reason != ReasonCode::ContainsSystemCritical {
            out.push(candidate(node, verdict, policy, safety.platform()));
            return;
        }
        debug!(path = %node.path.display(), "contains a protected location; descending");
    }
    for child in &node.children {
        visit(child, false, policy, safety, out);
    }
}

fn candidate(
    node: &PathNode,
    verdict: SafetyVerdict,
    policy: &RankPolicy,
    platform: &dyn Platform,
) -> Candidate {
    let classification = verdict.classification();
    let suggested_target = if classification == Classification::Protected {
        None
    } else {
        suggest_target(&node.path, node.size_bytes, policy, platform)
    };
    Candidate {
        node: node.summary(),
        classification,
        reason: verdict.reason.describe().to_string(),
        verdict,
        category: categorize(&node.path),
        suggested_target,
    }
}

/// The configured volume with the most free space that is not `path`'s own volume
/// and can hold `size` plus the margin.
fn suggest_target(
    path: &Path,
    size: u64,
    policy: &RankPolicy,
    platform: &dyn Platform,
) -> Option<PathBuf> {
    let required = with_margin(size, policy.space_margin_percent);
    policy
        .target_volumes
        .iter()
        .filter(|v| platform.volume_exists(v))
        .filter(|v| !platform.same_volume(path, v).unwrap_or(true))
        .filter_map(|v| platform.free_bytes(v).ok().map(|free| (v, free)))
        .filter(|(_, free)| *free >= required)
        .max_by(|(a, fa), (b, fb)| fa.cmp(fb).then_with(|| b.cmp(a)))
        .map(|(v, _)| v.clone())
}
