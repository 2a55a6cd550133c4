//! Unique hidden sibling names for atomic writes and trial links.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Pattern: `.cleanshift.<tag>.<pid>.<nanos>.<seq>` inside `dir`.
pub fn tmp_name_in(dir: &Path, tag: &str) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    dir.join(format!(".cleanshift.{tag}.{pid}.{nanos}.{seq}"))
}

/// Sibling of `target` (same directory), used for config writes.
pub fn tmp_sibling_name(target: &Path, tag: &str) -> PathBuf {
    tmp_name_in(target.parent().unwrap_or_else(|| Path::new(".")), tag)
}
