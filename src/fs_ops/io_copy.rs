//! Chunked file copy with progress reporting and durability control.
//!
//! - Destination is created with `create_new` (never clobbers).
//! - After every chunk the `on_chunk` callback receives the byte count; returning an
//!   error aborts the copy. Cancellation and stall detection hook in there.
//! - Snapshot semantics: the source is read once to EOF; concurrent growth is not copied.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

/// Post-write flush behaviour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurabilityMode {
    /// Data reaches the OS page cache; no disk barrier.
    Data,
    /// Data and metadata are forced to stable storage (`sync_all`).
    Full,
}

pub(crate) const BUF_SIZE: usize = 1024 * 1024;

/// Copy `src` to the new file `dst`, returning bytes written.
pub(crate) fn copy_file_chunked(
    src: &Path,
    dst: &Path,
    mode: DurabilityMode,
    on_chunk: &mut dyn FnMut(u64) -> io::Result<()>,
) -> io::Result<u64> {
    let mut src_f = File::open(src)?;

    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        if mode == DurabilityMode::Full {
            const FILE_FLAG_WRITE_THROUGH: u32 = 0x8000_0000;
            opts.custom_flags(FILE_FLAG_WRITE_THROUGH);
        }
    }
    let mut dst_f = opts.open(dst)?;

    let mut total: u64 = 0;

    // In-kernel copy where supported; falls back to the read/write loop when the
    // filesystem pair rejects it before any bytes moved.
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        let chunk: usize = 8 * BUF_SIZE;
        loop {
            let rc = unsafe {
                libc::copy_file_range(
                    src_f.as_raw_fd(),
                    std::ptr::null_mut(),
                    dst_f.as_raw_fd(),
                    std::ptr::null_mut(),
                    chunk,
                    0,
                )
            };
            if rc > 0 {
                total += rc as u64;
                on_chunk(rc as u64)?;
                continue;
            }
            if rc == 0 {
                return finish(dst_f, mode, total);
            }
            let err = io::Error::last_os_error();
            let unsupported = matches!(
                err.raw_os_error(),
                Some(libc::EXDEV | libc::ENOSYS | libc::EINVAL | libc::EPERM | libc::EOPNOTSUPP)
            );
            if total == 0 && unsupported {
                break;
            }
            return Err(err);
        }
    }

    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match src_f.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dst_f.write_all(&buf[..n])?;
        total += n as u64;
        on_chunk(n as u64)?;
    }
    finish(dst_f, mode, total)
}

fn finish(mut f: File, mode: DurabilityMode, total: u64) -> io::Result<u64> {
    f.flush()?;
    if mode == DurabilityMode::Full {
        f.sync_all()?;
    }
    Ok(total)
}
