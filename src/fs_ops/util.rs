use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

pub(crate) const STAGING_PREFIX: &str = ".cleanshift.staging.";

/// Hidden staging directory for `name` inside `dir`:
/// `.cleanshift.staging.<pid>.<nanos>.<name>`.
pub fn staging_path(dir: &Path, name: &OsStr) -> PathBuf {
    let pid = std::process::id();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut file_name = std::ffi::OsString::from(format!("{STAGING_PREFIX}{pid}.{nanos}."));
    file_name.push(name);
    dir.join(file_name)
}

pub fn is_staging_name(name: &OsStr) -> bool {
    name.to_string_lossy().starts_with(STAGING_PREFIX)
}

/// Remove whatever sits at `path`: a link is unlinked (its target untouched), a directory
/// is removed recursively. A missing path is not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.file_type().is_symlink() {
        crate::platform::remove_link(path)
    } else if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// [`remove_tree`], retried once after restoring owner write access below `path`
/// when the first attempt hits a permission error (read-only directories or files
/// carried over from the source by metadata preservation).
pub fn force_remove_tree(path: &Path) -> io::Result<()> {
    match remove_tree(path) {
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
                if !entry.file_type().is_symlink() {
                    make_owner_writable(entry.path());
                }
            }
            remove_tree(path)
        }
        other => other,
    }
}

#[cfg(unix)]
fn make_owner_writable(p: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(m) = fs::symlink_metadata(p) {
        let mode = m.permissions().mode() | 0o700;
        let _ = fs::set_permissions(p, fs::Permissions::from_mode(mode));
    }
}

#[cfg(windows)]
fn make_owner_writable(p: &Path) {
    if let Ok(m) = fs::symlink_metadata(p) {
        let mut perms = m.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            let _ = fs::set_permissions(p, perms);
        }
    }
}

#[cfg(unix)]
pub fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(windows)]
pub fn fsync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn staging_name_is_hidden_and_keeps_source_name() {
        let p = staging_path(Path::new("/vol/CleanShift_Moved"), OsStr::new("node_modules"));
        let name = p.file_name().unwrap();
        assert!(is_staging_name(name));
        assert!(name.to_string_lossy().ends_with(".node_modules"));
        assert_eq!(p.parent(), Some(Path::new("/vol/CleanShift_Moved")));
    }

    #[test]
    fn remove_tree_missing_is_ok() {
        let dir = tempdir().unwrap();
        remove_tree(&dir.path().join("nope")).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn force_remove_handles_read_only_directories() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let staged = dir.path().join("staged");
        fs::create_dir_all(staged.join("ro")).unwrap();
        fs::write(staged.join("ro/f"), b"1").unwrap();
        fs::set_permissions(staged.join("ro"), fs::Permissions::from_mode(0o555)).unwrap();
        force_remove_tree(&staged).unwrap();
        assert!(!staged.exists());
    }

    #[cfg(unix)]
    #[test]
    fn remove_tree_unlinks_without_touching_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("t");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"1").unwrap();
        let link = dir.path().join("l");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        remove_tree(&link).unwrap();
        assert!(!link.exists());
        assert!(target.join("keep").exists());
    }
}
