//! Byte/file tally of a directory tree, used to verify a staged copy and the final link.

use serde::Serialize;
use std::fs::FileType;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::shutdown::CancelToken;

/// Content counts below a root (the root itself is not counted).
/// Symbolic links count as `links`, never as files, and are not followed. FIFOs,
/// sockets and device nodes count as `special` and contribute no bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeTally {
    pub bytes: u64,
    pub files: u64,
    pub dirs: u64,
    pub links: u64,
    pub special: u64,
}

impl TreeTally {
    /// Bytes the tree needs on a target volume, `margin_percent` included.
    pub fn with_margin(&self, margin_percent: u32) -> u64 {
        crate::utils::with_margin(self.bytes, margin_percent)
    }
}

/// What kind of special file `ft` is, or `None` for regular files, directories and
/// links. Special files are never opened: reading a FIFO blocks until a writer appears.
#[cfg(unix)]
pub fn special_kind(ft: &FileType) -> Option<&'static str> {
    use std::os::unix::fs::FileTypeExt;
    if ft.is_fifo() {
        Some("named pipe")
    } else if ft.is_socket() {
        Some("socket")
    } else if ft.is_block_device() {
        Some("block device")
    } else if ft.is_char_device() {
        Some("character device")
    } else {
        None
    }
}

#[cfg(not(unix))]
pub fn special_kind(_ft: &FileType) -> Option<&'static str> {
    None
}

fn walk_error(e: walkdir::Error) -> io::Error {
    let msg = e.to_string();
    e.into_io_error().unwrap_or_else(|| io::Error::other(msg))
}

/// Walk `root` (following `root` itself if it is a link) and count its content.
/// Returns `ErrorKind::Interrupted` when `cancel` fires mid-walk.
pub fn tally_tree(root: &Path, cancel: Option<&CancelToken>) -> io::Result<TreeTally> {
    let mut t = TreeTally::default();
    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "tally cancelled"));
        }
        let entry = entry.map_err(walk_error)?;
        let ft = entry.file_type();
        if ft.is_symlink() {
            t.links += 1;
        } else if ft.is_dir() {
            t.dirs += 1;
        } else if special_kind(&ft).is_some() {
            t.special += 1;
        } else {
            t.files += 1;
            t.bytes += entry.metadata().map_err(walk_error)?.len();
        }
    }
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn counts_nested_content_not_root() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("x"), vec![0u8; 10]).unwrap();
        fs::write(root.join("a/y"), vec![0u8; 20]).unwrap();
        fs::write(root.join("a/b/z"), vec![0u8; 5]).unwrap();
        let t = tally_tree(root, None).unwrap();
        assert_eq!(
            t,
            TreeTally {
                bytes: 35,
                files: 3,
                dirs: 2,
                links: 0,
                special: 0,
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn links_are_counted_not_followed() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("big"), vec![0u8; 1000]).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("l")).unwrap();
        let t = tally_tree(dir.path(), None).unwrap();
        assert_eq!(t.links, 1);
        assert_eq!(t.bytes, 0);
    }

    #[cfg(unix)]
    #[test]
    fn fifo_is_special_not_a_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data"), b"abc").unwrap();
        let fifo = std::ffi::CString::new(dir.path().join("pipe").to_str().unwrap()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(fifo.as_ptr(), 0o644) }, 0);
        let t = tally_tree(dir.path(), None).unwrap();
        assert_eq!(t.files, 1);
        assert_eq!(t.special, 1);
        assert_eq!(t.bytes, 3);
    }

    #[test]
    fn cancelled_tally_is_interrupted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("f"), b"1").unwrap();
        let c = CancelToken::new();
        c.cancel();
        let err = tally_tree(dir.path(), Some(&c)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Interrupted);
    }
}
