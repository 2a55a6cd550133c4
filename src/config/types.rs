//! Core configuration types.
//! - Config holds runtime settings with defaults and converts them into the
//!   per-component settings of the scanner, ranker, safety policy and engine.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::paths;
use super::{
    MIN_SIZE_MB_DEFAULT, MOVE_DIR_NAME_DEFAULT, SPACE_MARGIN_PERCENT_DEFAULT,
    STALL_TIMEOUT_SECS_DEFAULT,
};
use crate::engine::EngineSettings;
use crate::fs_ops::DurabilityMode;
use crate::rank::RankPolicy;
use crate::safety::ProtectedTable;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
    /// Append-only JSON-lines record of finished move jobs
    pub result_log: Option<PathBuf>,
    /// Smallest directory (MiB) the ranker offers as a candidate
    pub min_size_mb: u64,
    /// Headroom demanded on the target volume on top of the tree size
    pub space_margin_percent: u32,
    /// A move with no copy progress for this long is abandoned
    pub stall_timeout: Duration,
    /// Scan worker threads; 0 = one per CPU
    pub scan_threads: usize,
    /// Directory created on the target volume for relocated trees
    pub move_dir_name: String,
    pub preserve_metadata: bool,
    /// Added to the built-in protected table
    pub protected_paths: Vec<PathBuf>,
    /// Paths that need explicit confirmation before they are moved
    pub confirm_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Normal,
            log_file: paths::default_log_path(),
            result_log: paths::default_result_log_path(),
            min_size_mb: MIN_SIZE_MB_DEFAULT,
            space_margin_percent: SPACE_MARGIN_PERCENT_DEFAULT,
            stall_timeout: Duration::from_secs(STALL_TIMEOUT_SECS_DEFAULT),
            scan_threads: 0,
            move_dir_name: MOVE_DIR_NAME_DEFAULT.to_string(),
            preserve_metadata: true,
            protected_paths: Vec::new(),
            confirm_paths: Vec::new(),
        }
    }
}

impl Config {
    pub fn min_size_bytes(&self) -> u64 {
        self.min_size_mb.saturating_mul(1024 * 1024)
    }

    /// Built-in OS table plus the configured additions.
    pub fn protected_table(&self) -> ProtectedTable {
        ProtectedTable::platform_default()
            .with_protected(&self.protected_paths)
            .with_confirm(&self.confirm_paths)
    }

    pub fn rank_policy(&self, target_volumes: Vec<PathBuf>) -> RankPolicy {
        RankPolicy {
            min_size_bytes: self.min_size_bytes(),
            target_volumes,
            space_margin_percent: self.space_margin_percent,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            move_dir_name: self.move_dir_name.clone(),
            space_margin_percent: self.space_margin_percent,
            stall_timeout: self.stall_timeout,
            preserve_metadata: self.preserve_metadata,
            durability: DurabilityMode::Full,
        }
    }
}
