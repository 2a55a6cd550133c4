//! Config validation: rejects values that would make a scan or move misbehave.

use anyhow::{Result, bail};
use std::path::{Component, Path};
use tracing::{debug, error};

use super::types::Config;

const MAX_MARGIN_PERCENT: u32 = 100;
const MAX_SCAN_THREADS: usize = 1024;

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.min_size_mb == 0 {
            bail!("min_size_mb must be at least 1");
        }
        if self.space_margin_percent > MAX_MARGIN_PERCENT {
            bail!(
                "space_margin_percent must be between 0 and {MAX_MARGIN_PERCENT}, got {}",
                self.space_margin_percent
            );
        }
        if self.stall_timeout.is_zero() {
            bail!("stall_timeout_seconds must be at least 1");
        }
        if self.scan_threads > MAX_SCAN_THREADS {
            bail!(
                "scan_threads must be at most {MAX_SCAN_THREADS}, got {}",
                self.scan_threads
            );
        }
        ensure_plain_name(&self.move_dir_name)?;
        for p in self.protected_paths.iter().chain(&self.confirm_paths) {
            if !p.is_absolute() {
                error!(path = %p.display(), "relative path in protected/confirm list");
                bail!("protected_path/confirm_path must be absolute: {}", p.display());
            }
        }
        for (name, p) in [("log_file", &self.log_file), ("result_log", &self.result_log)] {
            if let Some(p) = p
                && p.is_dir()
            {
                bail!("{name} points to a directory: {}", p.display());
            }
        }
        debug!(
            min_size_mb = self.min_size_mb,
            margin = self.space_margin_percent,
            stall_secs = self.stall_timeout.as_secs(),
            "config validated"
        );
        Ok(())
    }
}

/// A single, ordinary path component.
fn ensure_plain_name(name: &str) -> Result<()> {
    let mut comps = Path::new(name).components();
    match (comps.next(), comps.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => bail!("move_dir_name must be a single folder name, got '{name}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            Config {
                space_margin_percent: 250,
                ..Config::default()
            },
            Config {
                stall_timeout: Duration::ZERO,
                ..Config::default()
            },
            Config {
                min_size_mb: 0,
                ..Config::default()
            },
            Config {
                move_dir_name: "../escape".into(),
                ..Config::default()
            },
            Config {
                move_dir_name: String::new(),
                ..Config::default()
            },
            Config {
                protected_paths: vec![PathBuf::from("relative/dir")],
                ..Config::default()
            },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }
}
