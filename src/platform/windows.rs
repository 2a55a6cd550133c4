//! Windows implementations of the native platform backend (best-effort, no ACL management).
//!
//! Notes:
//! - Links are directory symlinks (`mklink /D` semantics); creating them needs either
//!   elevation or Developer Mode, so the engine tries one before copying.
//! - Process reference detection is not implemented here and always reports none.

use super::temp::tmp_sibling_name;
use anyhow::{Result, bail};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::path::{Component, Path};

pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Write a new config file via temp + rename. Fails if the target already exists.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling_name(path, "config.tmp");
    let mut f = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
    f.write_all(contents)?;
    f.sync_all()?;
    drop(f);
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

pub fn free_space_bytes(path: &Path) -> io::Result<u64> {
    use windows_sys::Win32::Storage::FileSystem::GetDiskFreeSpaceExW;
    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(once(0)).collect();
    let mut free_avail: u64 = 0;
    let mut total: u64 = 0;
    let mut total_free: u64 = 0;
    let ok = unsafe { GetDiskFreeSpaceExW(wide.as_ptr(), &mut free_avail, &mut total, &mut total_free) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(free_avail)
}

/// Whether the process token is elevated (UAC "run as administrator").
pub fn is_elevated() -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::Security::{
        GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let mut token: HANDLE = std::ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }
        let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
        let mut returned = 0u32;
        let ok = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut _ as *mut core::ffi::c_void,
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        );
        CloseHandle(token);
        ok != 0 && elevation.TokenIsElevated != 0
    }
}

/// Read-only parents and the system-owned install roots need an elevated token.
pub fn needs_elevation(path: &Path) -> bool {
    let lowered = path.to_string_lossy().to_lowercase();
    let system_owned = ["\\program files", "\\program files (x86)", "\\programdata"]
        .iter()
        .any(|root| lowered.contains(root));
    let parent_ro = path
        .parent()
        .and_then(|p| fs::metadata(p).ok())
        .map(|m| m.permissions().readonly())
        .unwrap_or(true);
    system_owned || parent_ro
}

/// Read-only attributes are cleared before removal, and ACL denials are not inspected.
pub fn can_empty_dir(_dir: &Path) -> bool {
    true
}

pub fn create_dir_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

fn volume_prefix(path: &Path) -> Option<String> {
    let canon = dunce::canonicalize(path).ok()?;
    match canon.components().next()? {
        Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().to_uppercase()),
        _ => None,
    }
}

/// Same volume when both canonical paths share a drive/UNC prefix.
pub fn same_volume(a: &Path, b: &Path) -> io::Result<bool> {
    match (volume_prefix(a), volume_prefix(b)) {
        (Some(x), Some(y)) => Ok(x == y),
        _ => Err(io::Error::new(
            io::ErrorKind::NotFound,
            "could not determine volume for path",
        )),
    }
}

/// `C:\` style roots: a prefix followed only by the root separator.
pub fn is_volume_root(path: &Path) -> bool {
    let mut comps = path.components();
    matches!(
        (comps.next(), comps.next(), comps.next()),
        (Some(Component::Prefix(_)), Some(Component::RootDir), None)
            | (Some(Component::RootDir), None, None)
    )
}

pub fn processes_using(_path: &Path) -> Vec<u32> {
    Vec::new()
}
