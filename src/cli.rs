//! CLI definition and parsing.
//!
//! Notes:
//! - Global logging flags apply to every subcommand.
//! - --debug is a shorthand for --log-level debug.
//! - Flags override the XML config; unset flags leave config values alone.

use clap::{Args as ClapArgs, Parser, Subcommand, ValueHint};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::types::{Config, LogLevel};

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Find large folders and relocate them to another volume behind a symlink"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    /// Emit logs in structured JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan a folder and list relocation candidates, largest first.
    Analyze(AnalyzeArgs),
    /// Relocate one folder to another volume and leave a link behind.
    Move(MoveArgs),
    /// Print where the config file is looked up, then exit.
    PrintConfig,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Folder to scan.
    #[arg(value_hint = ValueHint::DirPath)]
    pub root: PathBuf,

    /// Candidate threshold in MiB (overrides `min_size_mb`).
    #[arg(long, value_name = "MIB")]
    pub min_size_mb: Option<u64>,

    /// Volume to suggest as a destination (repeatable).
    #[arg(long = "target", value_name = "VOLUME", value_hint = ValueHint::DirPath)]
    pub targets: Vec<PathBuf>,

    /// Treat folders at this depth as opaque leaves.
    #[arg(long, value_name = "N")]
    pub max_depth: Option<usize>,

    /// Descend into linked folders (cycles are detected).
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Scanner worker threads (overrides `scan_threads`; 0 = one per CPU).
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,

    /// Show at most this many candidates.
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Print candidates as a JSON array instead of a table.
    #[arg(long)]
    pub report_json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct MoveArgs {
    /// Folder to relocate.
    #[arg(value_hint = ValueHint::DirPath)]
    pub source: PathBuf,

    /// Any folder on the destination volume (usually its root).
    #[arg(value_hint = ValueHint::DirPath)]
    pub target_volume: PathBuf,

    /// Accept a "needs confirmation" verdict without prompting.
    #[arg(long, short = 'y')]
    pub confirm: bool,

    /// Run every pre-flight check and print the plan; touch nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Abandon the move after this many seconds without copy progress.
    #[arg(long, value_name = "SECS")]
    pub stall_timeout: Option<u64>,

    /// Do not copy timestamps and permissions.
    #[arg(long)]
    pub no_preserve_metadata: bool,

    /// Folder name created on the target volume (overrides `move_dir_name`).
    #[arg(long, value_name = "NAME")]
    pub move_dir_name: Option<String>,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        match &self.command {
            Command::Analyze(a) => {
                if let Some(mb) = a.min_size_mb {
                    cfg.min_size_mb = mb;
                }
                if let Some(t) = a.threads {
                    cfg.scan_threads = t;
                }
            }
            Command::Move(m) => {
                if let Some(secs) = m.stall_timeout {
                    cfg.stall_timeout = Duration::from_secs(secs);
                }
                if m.no_preserve_metadata {
                    cfg.preserve_metadata = false;
                }
                if let Some(name) = &m.move_dir_name {
                    cfg.move_dir_name = name.clone();
                }
            }
            Command::PrintConfig => {}
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
