//! Platform capability interface.
//!
//! Everything the scanner, safety policy and move engine need from the OS sits behind
//! [`Platform`]: volume free space and existence, privilege state, link creation and
//! resolution, and best-effort process reference detection. Every method defaults to the
//! native backend, so tests implement the trait on a small struct and override only the
//! capability they want to fake.

mod temp;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use unix as native;
#[cfg(windows)]
use windows as native;

pub use native::{open_log_file_secure_append, write_config_secure_new_0600};
pub use temp::tmp_name_in;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait Platform: Send + Sync {
    /// Bytes available for new data on the volume holding `volume`.
    fn free_bytes(&self, volume: &Path) -> io::Result<u64> {
        native::free_space_bytes(volume)
    }

    fn volume_exists(&self, volume: &Path) -> bool {
        volume.is_dir()
    }

    fn is_elevated(&self) -> bool {
        native::is_elevated()
    }

    /// Whether relocating `path` needs more filesystem rights than the current user holds.
    fn needs_elevation(&self, path: &Path) -> bool {
        native::needs_elevation(path)
    }

    /// Whether the current user can delete everything directly inside `dir`, if need be
    /// after restoring owner write access.
    fn can_empty_dir(&self, dir: &Path) -> bool {
        native::can_empty_dir(dir)
    }

    /// Create a directory link at `link` pointing to `target`.
    fn create_link(&self, target: &Path, link: &Path) -> io::Result<()> {
        native::create_dir_link(target, link)
    }

    fn resolve_link(&self, link: &Path) -> io::Result<PathBuf> {
        fs::read_link(link)
    }

    /// Check that a link can be created inside `dir` by creating and removing one.
    fn probe_link(&self, dir: &Path) -> io::Result<()> {
        let trial = tmp_name_in(dir, "linktest");
        self.create_link(dir, &trial)?;
        remove_link(&trial)
    }

    fn same_volume(&self, a: &Path, b: &Path) -> io::Result<bool> {
        native::same_volume(a, b)
    }

    fn is_volume_root(&self, path: &Path) -> bool {
        native::is_volume_root(path)
    }

    /// Pids of other processes referencing something under `path`. Best effort;
    /// an empty result does not prove the tree is idle.
    fn processes_using(&self, path: &Path) -> Vec<u32> {
        native::processes_using(path)
    }
}

/// The real operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePlatform;

impl Platform for NativePlatform {}

/// Remove a directory link without touching what it points to.
pub fn remove_link(link: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        fs::remove_dir(link)
    }
    #[cfg(not(windows))]
    {
        fs::remove_file(link)
    }
}
