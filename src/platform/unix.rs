//! Unix implementations of the native platform backend.

use super::temp::tmp_sibling_name;
use anyhow::{Context, Result};
use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))
}

/// Open log file for appending; set 0600 only when creating a new file.
/// Existing files keep their permissions (e.g. group-readable for log shipping).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let existed = path.exists();
    let f = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?;
    if !existed {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(f)
}

/// Atomically write `contents` to `path` with mode 0600:
/// temp sibling (O_EXCL) + fsync + rename + fsync parent.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "config path has no parent"))?;
    fs::create_dir_all(parent).with_context(|| format!("create parent '{}'", parent.display()))?;

    let tmp = tmp_sibling_name(path, "config.tmp");
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&tmp)
        .with_context(|| format!("create temp '{}'", tmp.display()))?;
    f.write_all(contents).context("write temp")?;
    f.sync_all().context("fsync temp")?;
    drop(f);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e)
            .with_context(|| format!("rename '{}' -> '{}'", tmp.display(), path.display()));
    }
    File::open(parent)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("fsync dir '{}'", parent.display()))?;
    Ok(())
}

/// Bytes available to unprivileged users on the filesystem holding `path` (statvfs).
pub fn free_space_bytes(path: &Path) -> io::Result<u64> {
    let cpath = c_path(path)?;
    let mut s: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut s) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    Ok((s.f_bavail as u64).saturating_mul(s.f_frsize as u64))
}

pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// True when the current user cannot write `path` itself or its parent directory,
/// both of which a relocation has to modify.
pub fn needs_elevation(path: &Path) -> bool {
    let writable = |p: &Path| match c_path(p) {
        Ok(c) => unsafe { libc::access(c.as_ptr(), libc::W_OK) == 0 },
        Err(_) => false,
    };
    let parent_ok = path.parent().map(writable).unwrap_or(false);
    !(parent_ok && writable(path))
}

/// True when the current user can delete the entries of `dir`: it is writable, or the
/// user owns it and can restore write access before removing.
pub fn can_empty_dir(dir: &Path) -> bool {
    let writable = match c_path(dir) {
        Ok(c) => unsafe { libc::access(c.as_ptr(), libc::W_OK) == 0 },
        Err(_) => false,
    };
    writable || fs::symlink_metadata(dir).is_ok_and(|m| m.uid() == unsafe { libc::geteuid() })
}

pub fn create_dir_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Same filesystem when both paths report the same device id.
pub fn same_volume(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(fs::metadata(a)?.dev() == fs::metadata(b)?.dev())
}

/// A directory is a volume root when it is `/` or sits on a different device than its parent.
pub fn is_volume_root(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return true;
    };
    match (fs::symlink_metadata(path), fs::metadata(parent)) {
        (Ok(m), Ok(pm)) => m.is_dir() && !m.file_type().is_symlink() && m.dev() != pm.dev(),
        _ => false,
    }
}

/// Best-effort scan of `/proc` for processes whose cwd, executable, or open
/// descriptors live under `path`. Unreadable processes are skipped.
#[cfg(target_os = "linux")]
pub fn processes_using(path: &Path) -> Vec<u32> {
    let me = std::process::id();
    let Ok(procs) = fs::read_dir("/proc") else {
        return Vec::new();
    };
    let under = |p: PathBuf| p.starts_with(path);
    let mut pids = Vec::new();
    for entry in procs.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if pid == me {
            continue;
        }
        let base = entry.path();
        let mut hit = ["cwd", "exe", "root"]
            .iter()
            .any(|l| fs::read_link(base.join(l)).map(under).unwrap_or(false));
        if !hit {
            if let Ok(fds) = fs::read_dir(base.join("fd")) {
                hit = fds
                    .flatten()
                    .any(|fd| fs::read_link(fd.path()).map(under).unwrap_or(false));
            }
        }
        if hit {
            pids.push(pid);
        }
    }
    pids
}

#[cfg(not(target_os = "linux"))]
pub fn processes_using(_path: &Path) -> Vec<u32> {
    Vec::new()
}
