//! Core library for `cleanshift`.
//!
//! Finds large directory trees on a crowded volume and relocates them to another volume,
//! leaving a symbolic link at the original path so nothing that referenced it breaks.
//!
//! Components:
//! - [`scan`]: parallel size index of a directory tree (cancellable, restartable).
//! - [`rank`]: relocation candidates above a size threshold, largest first.
//! - [`safety`]: protected-path table and per-path verdicts.
//! - [`engine`]: the copy/verify/remove/link move protocol with rollback.
//! - [`platform`]: OS capabilities behind a trait so tests can fake them.

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs_ops;
pub mod output;
pub mod platform;
pub mod rank;
pub mod safety;
pub mod scan;
pub mod shutdown;
pub mod utils;

pub use config::{Config, LogLevel, default_config_path, load_config_from_xml_path};
pub use engine::{
    EngineSettings, JobHandle, JobRegistry, MoveJob, MovePlan, MoveReport, MoveRequest, MoveState,
    RelocationEngine, ResultLog,
};
pub use errors::{MoveError, MoveFailure, PolicyError, ScanError};
pub use platform::{NativePlatform, Platform};
pub use rank::{Candidate, Category, RankPolicy, rank};
pub use safety::{ProtectedTable, ReasonCode, SafetyPolicy, SafetyVerdict};
pub use scan::{PathNode, ScanOptions, SizeIndex, scan};
pub use shutdown::CancelToken;
pub use utils::format_bytes;

/// Common imports for callers embedding the engine.
pub mod prelude {
    pub use crate::config::{Config, LogLevel};
    pub use crate::engine::{MoveJob, MoveRequest, MoveState, RelocationEngine};
    pub use crate::errors::{MoveError, MoveFailure, PolicyError, ScanError};
    pub use crate::platform::{NativePlatform, Platform};
    pub use crate::rank::{Candidate, RankPolicy, rank};
    pub use crate::safety::{ProtectedTable, SafetyPolicy};
    pub use crate::scan::{ScanOptions, SizeIndex, scan};
    pub use crate::shutdown::{CancelToken, request as request_shutdown};
}
