//! Default path helpers and symlink checks.
//! Determines OS-appropriate config/log paths and detects symlinked ancestors.

use anyhow::Result;
use dirs::{config_dir, data_dir};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CLEANSHIFT_CONFIG";

const APP_DIR: &str = "cleanshift";

fn home_fallback(parts: &[&str]) -> Option<PathBuf> {
    env::var_os("HOME").map(|h| parts.iter().fold(PathBuf::from(h), |p, s| p.join(s)))
}

/// Config file location: `$CLEANSHIFT_CONFIG` (relative values resolved against the
/// current directory) or the OS config dir.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        let p = PathBuf::from(p);
        return Some(std::path::absolute(&p).unwrap_or(p));
    }
    match config_dir() {
        Some(base) => Some(base.join(APP_DIR).join("config.xml")),
        None => home_fallback(&[".config", APP_DIR, "config.xml"]),
    }
}

fn data_file(name: &str) -> Option<PathBuf> {
    match data_dir() {
        Some(base) => Some(base.join(APP_DIR).join(name)),
        None => home_fallback(&[".local", "share", APP_DIR, name]),
    }
}

/// OS-appropriate default log file path (data dir).
pub fn default_log_path() -> Option<PathBuf> {
    data_file("cleanshift.log")
}

/// Default location of the move result log.
pub fn default_result_log_path() -> Option<PathBuf> {
    data_file("moves.jsonl")
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        match fs::symlink_metadata(anc) {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(true),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        p = anc.parent();
    }
    Ok(false)
}

/// Create the parent directory of a file we are about to write (0700 on Unix).
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(unix)]
    #[test]
    fn detects_symlinked_ancestor() {
        let td = tempdir().unwrap();
        let real = td.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = td.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(path_has_symlink_ancestor(&link.join("x.log")).unwrap());
        assert!(!path_has_symlink_ancestor(&real.join("x.log")).unwrap());
    }

    #[test]
    fn missing_ancestors_are_not_symlinks() {
        let td = tempdir().unwrap();
        let p = td.path().join("a/b/c/file.log");
        assert!(!path_has_symlink_ancestor(&p).unwrap());
    }
}
