//! Promotion of a verified staging directory to its final name.
//! - Refuses to replace an existing destination (a directory rename onto an empty
//!   directory would otherwise succeed silently on Unix).
//! - fsyncs the destination directory after the rename (best-effort).

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

pub fn try_atomic_move(src: &Path, dst: &Path) -> Result<()> {
    if fs::symlink_metadata(dst).is_ok() {
        bail!("destination already exists: {}", dst.display());
    }
    fs::rename(src, dst)
        .with_context(|| format!("atomic rename '{}' -> '{}'", src.display(), dst.display()))?;
    if let Some(parent) = dst.parent() {
        let _ = super::util::fsync_dir(parent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn renames_directory_with_content() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        fs::create_dir(&a).unwrap();
        fs::write(a.join("f"), b"x").unwrap();
        let b = dir.path().join("b");
        try_atomic_move(&a, &b).unwrap();
        assert!(!a.exists());
        assert_eq!(fs::read(b.join("f")).unwrap(), b"x");
    }

    #[test]
    fn refuses_existing_empty_destination() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        let err = try_atomic_move(&a, &b).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(a.exists());
    }
}
