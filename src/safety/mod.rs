//! Safety policy: decides whether a path may be relocated.
//!
//! A verdict is recomputed on every query (process references and privileges change),
//! never cached across scans. Entries in the protected table and volume roots are always
//! protected; process references and the confirm list are advisory and only require
//! confirmation.

mod table;

pub use table::{ProtectedTable, TableMatch};

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::errors::PolicyError;
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Movable,
    SystemCritical,
    ContainsSystemCritical,
    VolumeRoot,
    InUseByProcess,
    ConfirmListed,
    ElevationNeeded,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::Movable => "movable",
            ReasonCode::SystemCritical => "system-critical",
            ReasonCode::ContainsSystemCritical => "contains-system-critical",
            ReasonCode::VolumeRoot => "volume-root",
            ReasonCode::InUseByProcess => "in-use-by-process",
            ReasonCode::ConfirmListed => "confirm-listed",
            ReasonCode::ElevationNeeded => "elevation-needed",
        }
    }

    /// One-line explanation for analysis output.
    pub fn describe(self) -> &'static str {
        match self {
            ReasonCode::Movable => "safe to relocate",
            ReasonCode::SystemCritical => "operating system location; never relocated",
            ReasonCode::ContainsSystemCritical => "contains an operating system location",
            ReasonCode::VolumeRoot => "root of a volume",
            ReasonCode::InUseByProcess => "referenced by a running process",
            ReasonCode::ConfirmListed => "listed as needing confirmation",
            ReasonCode::ElevationNeeded => "needs administrator/root rights",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Movable,
    Protected,
    RequiresConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetyVerdict {
    pub protected: bool,
    pub requires_elevation: bool,
    pub requires_confirmation: bool,
    pub reason: ReasonCode,
}

impl SafetyVerdict {
    fn protected(reason: ReasonCode) -> Self {
        Self {
            protected: true,
            requires_elevation: false,
            requires_confirmation: false,
            reason,
        }
    }

    pub fn classification(&self) -> Classification {
        if self.protected {
            Classification::Protected
        } else if self.requires_confirmation {
            Classification::RequiresConfirmation
        } else {
            Classification::Movable
        }
    }
}

pub struct SafetyPolicy {
    table: ProtectedTable,
    platform: Arc<dyn Platform>,
}

impl fmt::Debug for SafetyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyPolicy")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl SafetyPolicy {
    pub fn new(table: ProtectedTable, platform: Arc<dyn Platform>) -> Self {
        Self { table, platform }
    }

    pub fn table(&self) -> &ProtectedTable {
        &self.table
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn evaluate(&self, path: &Path) -> SafetyVerdict {
        let canonical = dunce::canonicalize(path).ok();
        let matched = [Some(path), canonical.as_deref()]
            .into_iter()
            .flatten()
            .map(|p| self.table.classify(p))
            .min_by_key(|m| match m {
                TableMatch::Protected => 0,
                TableMatch::ContainsProtected => 1,
                TableMatch::Confirm => 2,
                TableMatch::None => 3,
            })
            .unwrap_or(TableMatch::None);

        match matched {
            TableMatch::Protected => return SafetyVerdict::protected(ReasonCode::SystemCritical),
            TableMatch::ContainsProtected => {
                return SafetyVerdict::protected(ReasonCode::ContainsSystemCritical);
            }
            _ => {}
        }
        if path.parent().is_none() || self.platform.is_volume_root(path) {
            return SafetyVerdict::protected(ReasonCode::VolumeRoot);
        }

        let pids = self.platform.processes_using(canonical.as_deref().unwrap_or(path));
        let requires_elevation = self.platform.needs_elevation(path);
        let (requires_confirmation, reason) = if !pids.is_empty() {
            debug!(path = %path.display(), ?pids, "path referenced by running processes");
            (true, ReasonCode::InUseByProcess)
        } else if matched == TableMatch::Confirm {
            (true, ReasonCode::ConfirmListed)
        } else if requires_elevation {
            (false, ReasonCode::ElevationNeeded)
        } else {
            (false, ReasonCode::Movable)
        };
        SafetyVerdict {
            protected: false,
            requires_elevation,
            requires_confirmation,
            reason,
        }
    }

    /// Pre-flight gate: evaluate `path` and turn anything that blocks a relocation into
    /// a [`PolicyError`].
    pub fn gate(&self, path: &Path, confirmed: bool) -> Result<SafetyVerdict, PolicyError> {
        let v = self.evaluate(path);
        if v.protected {
            return Err(PolicyError::Protected {
                path: path.to_path_buf(),
                reason: v.reason,
            });
        }
        if v.requires_confirmation && !confirmed {
            return Err(PolicyError::RequiresConfirmation {
                path: path.to_path_buf(),
                reason: v.reason,
            });
        }
        if v.requires_elevation && !self.platform.is_elevated() {
            return Err(PolicyError::ElevationRequired {
                path: path.to_path_buf(),
            });
        }
        Ok(v)
    }
}
