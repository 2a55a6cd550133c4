//! Move job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::errors::MoveError;
use crate::fs_ops::TreeTally;
use crate::safety::SafetyVerdict;

pub type JobId = u64;

/// Move protocol states. `Completed`, `Failed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveState {
    Pending,
    Copying,
    Verifying,
    SourceRemoving,
    Linking,
    LinkVerifying,
    Completed,
    Failed,
    RolledBack,
}

impl MoveState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MoveState::Completed | MoveState::Failed | MoveState::RolledBack
        )
    }

    /// States in which the source has been (or is being) removed: cancellation is
    /// deferred and failures are reported as inconsistencies, never rolled back.
    pub fn is_irreversible(self) -> bool {
        matches!(
            self,
            MoveState::SourceRemoving | MoveState::Linking | MoveState::LinkVerifying
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MoveState::Pending => "pending",
            MoveState::Copying => "copying",
            MoveState::Verifying => "verifying",
            MoveState::SourceRemoving => "source_removing",
            MoveState::Linking => "linking",
            MoveState::LinkVerifying => "link_verifying",
            MoveState::Completed => "completed",
            MoveState::Failed => "failed",
            MoveState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for MoveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is left at the original source path after an irreversible-phase failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// Untouched (only used when staging data could not be cleaned up).
    Intact,
    /// Deletion stopped part way; some original files remain.
    PartiallyRemoved,
    /// Source removed and no link in its place.
    LinkMissing,
    /// A link exists but does not resolve to the relocated content.
    LinkMalformed,
}

/// Exact filesystem state after a failure that automatic rollback cannot undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inconsistency {
    /// Where the complete copy of the data lives now.
    pub data_at: PathBuf,
    pub source_path: PathBuf,
    pub source_state: SourceState,
    pub detail: String,
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.source_state {
            SourceState::Intact => "is intact",
            SourceState::PartiallyRemoved => "was partially removed",
            SourceState::LinkMissing => "has been removed and NO link exists there",
            SourceState::LinkMalformed => "holds a link that does not resolve to the data",
        };
        write!(
            f,
            "data is at {}; original path {} {} ({})",
            self.data_at.display(),
            self.source_path.display(),
            what,
            self.detail
        )
    }
}

/// A relocation request from the presentation layer.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub source: PathBuf,
    /// Root (or any directory) of the volume that receives the data.
    pub target_volume: PathBuf,
    /// The user confirmed a RequiresConfirmation verdict.
    pub confirm: bool,
}

impl MoveRequest {
    pub fn new(source: impl Into<PathBuf>, target_volume: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target_volume: target_volume.into(),
            confirm: false,
        }
    }

    pub fn confirmed(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }
}

/// Snapshot of one relocation. Status readers always receive clones.
#[derive(Debug, Clone)]
pub struct MoveJob {
    pub id: JobId,
    pub source_path: PathBuf,
    pub target_volume: PathBuf,
    /// Final location: `<target_volume>/<move dir>/<source name>`.
    pub target_path: PathBuf,
    /// Hidden sibling of `target_path` that holds the copy until it is verified.
    pub staging_path: PathBuf,
    pub state: MoveState,
    pub bytes_copied: u64,
    /// Source tally the copy and the link are verified against.
    pub expected: Option<TreeTally>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<MoveError>,
    pub inconsistency: Option<Inconsistency>,
    /// Cancellation arrived during the irreversible phase and was not honoured.
    pub cancel_deferred: bool,
}

impl MoveJob {
    pub(crate) fn new(
        id: JobId,
        source: PathBuf,
        target_volume: PathBuf,
        target_path: PathBuf,
        staging_path: PathBuf,
    ) -> Self {
        Self {
            id,
            source_path: source,
            target_volume,
            target_path,
            staging_path,
            state: MoveState::Pending,
            bytes_copied: 0,
            expected: None,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            inconsistency: None,
            cancel_deferred: false,
        }
    }
}

/// Successful relocation.
#[derive(Debug, Clone)]
pub struct MoveReport {
    pub job: MoveJob,
    pub moved: TreeTally,
}

/// Outcome of pre-flight only (dry run): what a relocation would do.
#[derive(Debug, Clone, Serialize)]
pub struct MovePlan {
    pub source_path: PathBuf,
    pub target_volume: PathBuf,
    pub staging_path: PathBuf,
    pub target_path: PathBuf,
    pub link_path: PathBuf,
    pub tally: TreeTally,
    pub required_bytes: u64,
    pub available_bytes: u64,
    pub verdict: SafetyVerdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_irreversible_states() {
        assert!(MoveState::RolledBack.is_terminal());
        assert!(!MoveState::Verifying.is_terminal());
        assert!(MoveState::Linking.is_irreversible());
        assert!(!MoveState::Verifying.is_irreversible());
        assert!(!MoveState::Completed.is_irreversible());
    }

    #[test]
    fn inconsistency_message_names_data_location() {
        let i = Inconsistency {
            data_at: PathBuf::from("/vol/CleanShift_Moved/cache"),
            source_path: PathBuf::from("/home/u/cache"),
            source_state: SourceState::LinkMissing,
            detail: "permission denied".into(),
        };
        let s = i.to_string();
        assert!(s.contains("data is at /vol/CleanShift_Moved/cache"), "{s}");
        assert!(s.contains("NO link"), "{s}");
    }
}
