//! Typed error definitions for cleanshift.
//! One enum per stage (scan, policy, move) so callers can tell a recoverable failure
//! from an inconsistency that needs an operator.

use std::path::PathBuf;
use thiserror::Error;

use crate::engine::{MoveJob, MoveState};
use crate::fs_ops::TreeTally;
use crate::safety::ReasonCode;

/// Failures of the size scanner.
///
/// Only errors on the scan root surface as `ScanError`; errors on subtrees are recorded
/// on the affected node and the scan carries on.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Permission denied reading {0}")]
    PermissionDenied(PathBuf),

    #[error("Scan root not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Scan root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Scan cancelled before {0} could be listed")]
    Cancelled(PathBuf),

    #[error("Cannot read scan root {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("Failed to build scan worker pool: {0}")]
    Pool(String),
}

impl ScanError {
    pub fn code(&self) -> i32 {
        match self {
            ScanError::PermissionDenied(_) => 10,
            ScanError::PathNotFound(_) => 11,
            ScanError::NotADirectory(_) => 12,
            ScanError::Cancelled(_) => 13,
            ScanError::Unreadable { .. } => 14,
            ScanError::Pool(_) => 15,
        }
    }
}

/// Safety policy refusals. Always surfaced; never silently skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("{path} is protected ({reason}) and can never be relocated")]
    Protected { path: PathBuf, reason: ReasonCode },

    #[error("{path} needs explicit confirmation before it can be relocated ({reason})")]
    RequiresConfirmation { path: PathBuf, reason: ReasonCode },

    #[error("relocating {path} requires elevated privileges; re-run as administrator/root")]
    ElevationRequired { path: PathBuf },
}

impl PolicyError {
    pub fn code(&self) -> i32 {
        match self {
            PolicyError::Protected { .. } => 20,
            PolicyError::RequiresConfirmation { .. } => 21,
            PolicyError::ElevationRequired { .. } => 22,
        }
    }
}

/// Move protocol failures.
///
/// Details are kept as strings (not `io::Error`) so a job snapshot can be cloned to
/// status readers and serialised into the result log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("source does not exist: {0}")]
    SourceNotFound(PathBuf),

    #[error("source is not a directory: {0}")]
    SourceNotDirectory(PathBuf),

    #[error("source is already a symbolic link: {0}")]
    SourceIsLink(PathBuf),

    #[error("target volume does not exist: {0}")]
    TargetVolumeMissing(PathBuf),

    #[error("target volume {0} is the source's own volume")]
    SameVolume(PathBuf),

    #[error("target path already exists: {0}")]
    TargetExists(PathBuf),

    #[error("{path} is a {kind}; special files cannot be relocated")]
    UnsupportedEntry { path: PathBuf, kind: String },

    #[error("{path} overlaps in-flight move job {job}")]
    PathBusy { path: PathBuf, job: u64 },

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(
        "insufficient space on {volume}: need {required} bytes (including safety margin), have {available} bytes"
    )]
    InsufficientSpace {
        required: u64,
        available: u64,
        volume: PathBuf,
    },

    #[error("copy failed at {path}: {reason}")]
    CopyFailed { path: PathBuf, reason: String },

    #[error(
        "staged copy does not match source: expected {} bytes / {} files, found {} bytes / {} files",
        expected.bytes, expected.files, actual.bytes, actual.files
    )]
    VerificationMismatch {
        expected: TreeTally,
        actual: TreeTally,
    },

    #[error("failed to remove source {path}: {reason}")]
    SourceRemoveFailed { path: PathBuf, reason: String },

    #[error("failed to link {link} -> {target}: {reason}")]
    LinkCreateFailed {
        link: PathBuf,
        target: PathBuf,
        reason: String,
    },

    #[error("link {link} does not resolve to the relocated content: {reason}")]
    LinkVerifyMismatch { link: PathBuf, reason: String },

    #[error("no I/O progress for {idle_secs}s; move treated as stalled")]
    Timeout { idle_secs: u64 },

    #[error("move cancelled")]
    Cancelled,
}

impl MoveError {
    /// Stable numeric code for logs and exit statuses.
    pub fn code(&self) -> i32 {
        match self {
            MoveError::SourceNotFound(_) => 30,
            MoveError::SourceNotDirectory(_) => 31,
            MoveError::SourceIsLink(_) => 32,
            MoveError::TargetVolumeMissing(_) => 33,
            MoveError::SameVolume(_) => 34,
            MoveError::TargetExists(_) => 35,
            MoveError::PathBusy { .. } => 36,
            MoveError::UnsupportedEntry { .. } => 37,
            MoveError::Policy(p) => p.code(),
            MoveError::InsufficientSpace { .. } => 40,
            MoveError::CopyFailed { .. } => 41,
            MoveError::VerificationMismatch { .. } => 42,
            MoveError::SourceRemoveFailed { .. } => 43,
            MoveError::LinkCreateFailed { .. } => 44,
            MoveError::LinkVerifyMismatch { .. } => 45,
            MoveError::Timeout { .. } => 46,
            MoveError::Cancelled => 47,
        }
    }

    /// Short machine-friendly label used as the `kind` field in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MoveError::SourceNotFound(_) => "source_not_found",
            MoveError::SourceNotDirectory(_) => "source_not_directory",
            MoveError::SourceIsLink(_) => "source_is_link",
            MoveError::TargetVolumeMissing(_) => "target_volume_missing",
            MoveError::SameVolume(_) => "same_volume",
            MoveError::TargetExists(_) => "target_exists",
            MoveError::PathBusy { .. } => "path_busy",
            MoveError::UnsupportedEntry { .. } => "unsupported_entry",
            MoveError::Policy(PolicyError::Protected { .. }) => "protected",
            MoveError::Policy(PolicyError::RequiresConfirmation { .. }) => "requires_confirmation",
            MoveError::Policy(PolicyError::ElevationRequired { .. }) => "elevation_required",
            MoveError::InsufficientSpace { .. } => "insufficient_space",
            MoveError::CopyFailed { .. } => "copy_failed",
            MoveError::VerificationMismatch { .. } => "verification_mismatch",
            MoveError::SourceRemoveFailed { .. } => "source_remove_failed",
            MoveError::LinkCreateFailed { .. } => "link_create_failed",
            MoveError::LinkVerifyMismatch { .. } => "link_verify_mismatch",
            MoveError::Timeout { .. } => "timeout",
            MoveError::Cancelled => "cancelled",
        }
    }
}

/// A move that ended in `Failed` or `RolledBack`.
///
/// Carries the final job record so callers can inspect `state`, `inconsistency`
/// and the staging path without a second lookup.
#[derive(Debug, Error)]
#[error("move of {} ended in {:?}: {error}", job.source_path.display(), job.state)]
pub struct MoveFailure {
    pub error: MoveError,
    pub job: Box<MoveJob>,
}

impl MoveFailure {
    /// True when the failure left the filesystem in its pre-move state
    /// (nothing irreversible happened).
    pub fn is_recoverable(&self) -> bool {
        self.job.inconsistency.is_none()
    }

    pub fn state(&self) -> MoveState {
        self.job.state
    }
}
