//! I/O error enrichment.
//!
//! Prefixes an `io::Error` with the operation and path, then appends an actionable
//! hint keyed on the raw OS code (or `ErrorKind` when there is none).

use std::io;
use std::path::Path;

fn os_hint(code: i32) -> Option<&'static str> {
    #[cfg(unix)]
    {
        match code {
            libc::EACCES | libc::EPERM => Some("permission denied; check ownership and write permissions"),
            libc::EXDEV => Some("cross-filesystem; atomic rename not possible"),
            libc::EBUSY => Some("resource busy; another process is using it"),
            libc::ENOENT => Some("path not found; it may have been removed concurrently"),
            libc::EEXIST => Some("already exists; remove the target or pick another volume"),
            libc::ENOSPC => Some("target volume ran out of space"),
            libc::EDQUOT => Some("disk quota exceeded"),
            libc::EROFS => Some("read-only filesystem"),
            libc::ELOOP => Some("too many levels of symbolic links"),
            libc::ENAMETOOLONG => Some("path too long for the target filesystem"),
            libc::EMFILE | libc::ENFILE => Some("too many open files; raise the descriptor limit"),
            _ => None,
        }
    }
    #[cfg(windows)]
    {
        match code {
            5 => Some("access denied; run elevated or check permissions"),
            17 => Some("not the same device; atomic rename not possible"),
            32 | 33 => Some("file is in use by another process"),
            2 | 3 => Some("path not found; it may have been removed concurrently"),
            80 | 183 => Some("already exists; remove the target or pick another volume"),
            112 | 39 => Some("target volume ran out of space"),
            19 => Some("write-protected media"),
            206 => Some("path too long (MAX_PATH exceeded)"),
            1314 => Some("privilege not held; creating symbolic links needs elevation or Developer Mode"),
            _ => None,
        }
    }
}

fn kind_hint(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::PermissionDenied => Some("permission denied; check ownership and write permissions"),
        io::ErrorKind::NotFound => Some("path not found"),
        io::ErrorKind::AlreadyExists => Some("already exists"),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Some("timed out waiting for I/O"),
        _ => None,
    }
}

/// `"<op> '<path>': <error> (<hint>) [os code: N]"`
pub fn describe_io(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{op} '{}': {e}", path.display());
    let hint = match e.raw_os_error() {
        Some(code) => os_hint(code),
        None => kind_hint(e.kind()),
    };
    if let Some(h) = hint {
        msg.push_str(&format!(" ({h})"));
    }
    if let Some(code) = e.raw_os_error() {
        msg.push_str(&format!(" [os code: {code}]"));
    }
    msg
}
