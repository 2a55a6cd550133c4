//! Small path and formatting helpers shared by the scanner, ranker and engine.

use std::path::{Path, PathBuf};

/// Human-readable binary size (`1.5 GiB`, `312.0 KiB`, `17 B`).
pub fn format_bytes(n: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;
    let f = n as f64;
    if f >= TB {
        format!("{:.1} TiB", f / TB)
    } else if f >= GB {
        format!("{:.1} GiB", f / GB)
    } else if f >= MB {
        format!("{:.1} MiB", f / MB)
    } else if f >= KB {
        format!("{:.1} KiB", f / KB)
    } else {
        format!("{n} B")
    }
}

/// `bytes` plus `percent` % headroom, rounded up.
pub fn with_margin(bytes: u64, percent: u32) -> u64 {
    let extra = (bytes as u128 * percent as u128).div_ceil(100);
    bytes.saturating_add(extra.min(u64::MAX as u128) as u64)
}

/// Canonical form used for identity comparisons: symlinks resolved where the path
/// exists, no `\\?\` prefix on Windows, and case folded on Windows.
pub fn comparable(p: &Path) -> PathBuf {
    let canon = dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    fold_case(&canon)
}

#[cfg(windows)]
pub fn fold_case(p: &Path) -> PathBuf {
    PathBuf::from(p.to_string_lossy().to_lowercase())
}

#[cfg(not(windows))]
pub fn fold_case(p: &Path) -> PathBuf {
    p.to_path_buf()
}

/// True when one path equals or contains the other (component-wise, not string prefix).
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(17), "17 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 / 2), "1.5 MiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
    }

    #[test]
    fn margin_rounds_up() {
        assert_eq!(with_margin(1000, 5), 1050);
        assert_eq!(with_margin(1001, 5), 1052);
        assert_eq!(with_margin(7, 0), 7);
        assert_eq!(with_margin(u64::MAX, 5), u64::MAX);
    }

    #[test]
    fn overlap_is_component_wise() {
        assert!(paths_overlap(Path::new("/a/b"), Path::new("/a")));
        assert!(paths_overlap(Path::new("/a"), Path::new("/a/b/c")));
        assert!(paths_overlap(Path::new("/a"), Path::new("/a")));
        assert!(!paths_overlap(Path::new("/a/bc"), Path::new("/a/b")));
        assert!(!paths_overlap(Path::new("/x"), Path::new("/y")));
    }
}
