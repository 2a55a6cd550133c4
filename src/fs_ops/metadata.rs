//! Metadata preservation for staged copies.
//! Timestamps everywhere, permission bits on Unix, the readonly attribute on Windows,
//! and extended attributes with the `xattrs` feature. All best-effort: failures are
//! logged, never fatal, because the byte/file verification is what gates the move.

use filetime::{FileTime, set_file_times};
use std::fs;
use std::path::Path;
use tracing::{trace, warn};

/// Apply `src_meta`'s times and permissions to `dest`.
pub fn preserve_metadata(dest: &Path, src_meta: &fs::Metadata) {
    let at = FileTime::from_last_access_time(src_meta);
    let mt = FileTime::from_last_modification_time(src_meta);
    match set_file_times(dest, at, mt) {
        Ok(()) => trace!(path = %dest.display(), "set atime/mtime"),
        Err(e) => warn!(path = %dest.display(), error = %e, "failed to set atime/mtime"),
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = src_meta.permissions().mode() & 0o7777;
        if let Err(e) = fs::set_permissions(dest, fs::Permissions::from_mode(mode)) {
            warn!(path = %dest.display(), mode = format!("{mode:o}"), error = %e, "failed to set permissions");
        }
    }

    #[cfg(windows)]
    {
        let ro = src_meta.permissions().readonly();
        if ro {
            match fs::metadata(dest) {
                Ok(meta) => {
                    let mut perms = meta.permissions();
                    perms.set_readonly(true);
                    if let Err(e) = fs::set_permissions(dest, perms) {
                        warn!(path = %dest.display(), error = %e, "failed to set readonly attribute");
                    }
                }
                Err(e) => warn!(path = %dest.display(), error = %e, "failed to stat for readonly"),
            }
        }
    }
}

/// Copy extended attributes from `src` to `dest`. No-op without the `xattrs` feature.
pub fn preserve_xattrs(src: &Path, dest: &Path) {
    #[cfg(feature = "xattrs")]
    {
        let names = match xattr::list(src) {
            Ok(n) => n,
            Err(e) => {
                warn!(src = %src.display(), error = %e, "failed to list xattrs");
                return;
            }
        };
        for name in names {
            let value = match xattr::get(src, &name) {
                Ok(v) => v.unwrap_or_default(),
                Err(e) => {
                    warn!(src = %src.display(), xattr = %name.to_string_lossy(), error = %e, "failed to read xattr");
                    continue;
                }
            };
            if let Err(e) = xattr::set(dest, &name, &value) {
                warn!(dest = %dest.display(), xattr = %name.to_string_lossy(), error = %e, "failed to set xattr");
            }
        }
    }
    #[cfg(not(feature = "xattrs"))]
    {
        let _ = (src, dest);
    }
}
