//! Pre-flight checks and the move state machine.

use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::RelocationEngine;
use super::job::{Inconsistency, MoveJob, MovePlan, MoveReport, MoveRequest, MoveState, SourceState};
use super::registry::{JobKeys, JobSlot};
use super::result_log::ResultEntry;
use crate::errors::{MoveError, MoveFailure, PolicyError};
use crate::fs_ops::{
    CopyError, CopyOptions, TreeTally, copy_tree, describe_io, force_remove_tree, special_kind,
    staging_path, tally_tree, try_atomic_move,
};
use crate::safety::{ReasonCode, SafetyVerdict};
use crate::shutdown::CancelToken;
use crate::utils::{comparable, format_bytes};

/// Why a run stopped short of `Completed`.
struct Halt {
    error: MoveError,
    state: MoveState,
    inconsistency: Option<Inconsistency>,
}

impl Halt {
    fn failed(error: MoveError) -> Self {
        Self {
            error,
            state: MoveState::Failed,
            inconsistency: None,
        }
    }

    fn inconsistent(error: MoveError, inconsistency: Inconsistency) -> Self {
        Self {
            error,
            state: MoveState::Failed,
            inconsistency: Some(inconsistency),
        }
    }
}

/// Result of the checks run before anything is written.
struct Preflight {
    tally: TreeTally,
    required: u64,
    available: u64,
    verdict: SafetyVerdict,
}

/// Comparable form of a path that may not exist yet: the deepest existing ancestor is
/// canonicalised and the remaining components are appended as given.
fn comparable_key(p: &Path) -> PathBuf {
    if p.exists() {
        return comparable(p);
    }
    match (p.parent(), p.file_name()) {
        (Some(parent), Some(name)) => comparable_key(parent).join(crate::utils::fold_case(Path::new(name))),
        _ => comparable(p),
    }
}

fn absolute(p: &Path) -> PathBuf {
    std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf())
}

fn copy_failed(path: &Path, op: &str, e: &io::Error) -> MoveError {
    MoveError::CopyFailed {
        path: path.to_path_buf(),
        reason: describe_io(op, path, e),
    }
}

fn tally_error(path: &Path, e: io::Error) -> MoveError {
    if e.kind() == io::ErrorKind::Interrupted {
        MoveError::Cancelled
    } else {
        copy_failed(path, "measure tree", &e)
    }
}

impl From<CopyError> for MoveError {
    fn from(e: CopyError) -> Self {
        match e {
            CopyError::Cancelled => MoveError::Cancelled,
            CopyError::Stalled(idle) => MoveError::Timeout {
                idle_secs: idle.as_secs(),
            },
            CopyError::Io { path, message } => MoveError::CopyFailed {
                path,
                reason: message,
            },
        }
    }
}

impl RelocationEngine {
    /// Normalise a request into a job record plus the keys it is admitted under.
    fn describe_job(&self, request: &MoveRequest) -> (MoveJob, JobKeys, Option<MoveError>) {
        let id = self.registry.allocate_id();
        let source = absolute(&request.source);
        let volume = absolute(&request.target_volume);
        let move_dir = volume.join(&self.settings.move_dir_name);
        let (target, staging, invalid) = match source.file_name() {
            Some(name) => (move_dir.join(name), staging_path(&move_dir, name), None),
            None => (
                move_dir.clone(),
                move_dir.clone(),
                Some(MoveError::Policy(PolicyError::Protected {
                    path: source.clone(),
                    reason: ReasonCode::VolumeRoot,
                })),
            ),
        };
        let keys = JobKeys {
            source: comparable_key(&source),
            target: comparable_key(&target),
            staging: comparable_key(&staging),
        };
        (MoveJob::new(id, source, volume, target, staging), keys, invalid)
    }

    pub(super) fn admit(
        &self,
        request: &MoveRequest,
        cancel: CancelToken,
    ) -> Result<Arc<JobSlot>, MoveFailure> {
        let (job, keys, invalid) = self.describe_job(request);
        if let Some(e) = invalid {
            return Err(self.reject(job, e));
        }
        match self.registry.admit(keys, job.clone(), cancel) {
            Ok(slot) => {
                info!(
                    job = job.id,
                    source = %job.source_path.display(),
                    target = %job.target_path.display(),
                    "move job admitted"
                );
                Ok(slot)
            }
            Err(e) => Err(self.reject(job, e)),
        }
    }

    /// Dry run: every pre-flight check except the trial link, with nothing written.
    pub fn plan(&self, request: &MoveRequest) -> Result<MovePlan, MoveFailure> {
        let (job, keys, invalid) = self.describe_job(request);
        let checked = match invalid {
            Some(e) => Err(e),
            None => match self.registry.conflict(&keys) {
                Some((other, path)) => Err(MoveError::PathBusy { path, job: other }),
                None => self.preflight(&job, request.confirm, None, false),
            },
        };
        match checked {
            Ok(pf) => Ok(MovePlan {
                link_path: job.source_path.clone(),
                source_path: job.source_path,
                target_volume: job.target_volume,
                staging_path: job.staging_path,
                target_path: job.target_path,
                tally: pf.tally,
                required_bytes: pf.required,
                available_bytes: pf.available,
                verdict: pf.verdict,
            }),
            Err(error) => {
                let mut job = job;
                job.state = MoveState::Failed;
                job.error = Some(error.clone());
                Err(MoveFailure {
                    error,
                    job: Box::new(job),
                })
            }
        }
    }

    fn preflight(
        &self,
        job: &MoveJob,
        confirmed: bool,
        cancel: Option<&CancelToken>,
        check_link: bool,
    ) -> Result<Preflight, MoveError> {
        let source = &job.source_path;
        let volume = &job.target_volume;
        let meta = fs::symlink_metadata(source).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => MoveError::SourceNotFound(source.clone()),
            _ => copy_failed(source, "stat source", &e),
        })?;
        if meta.file_type().is_symlink() {
            return Err(MoveError::SourceIsLink(source.clone()));
        }
        if !meta.is_dir() {
            return Err(MoveError::SourceNotDirectory(source.clone()));
        }
        if !self.platform.volume_exists(volume) {
            return Err(MoveError::TargetVolumeMissing(volume.clone()));
        }
        match self.platform.same_volume(source, volume) {
            Ok(true) => return Err(MoveError::SameVolume(volume.clone())),
            Ok(false) => {}
            Err(e) => debug!(error = %e, "could not compare volumes; assuming distinct"),
        }
        if fs::symlink_metadata(&job.target_path).is_ok() {
            return Err(MoveError::TargetExists(job.target_path.clone()));
        }
        let verdict = self.safety.gate(source, confirmed)?;
        self.inspect_source(source, cancel)?;

        let tally = tally_tree(source, cancel).map_err(|e| tally_error(source, e))?;
        let required = tally.with_margin(self.settings.space_margin_percent);
        let available = self
            .platform
            .free_bytes(volume)
            .map_err(|e| copy_failed(volume, "query free space", &e))?;
        if available < required {
            return Err(MoveError::InsufficientSpace {
                required,
                available,
                volume: volume.clone(),
            });
        }
        if check_link && let Some(parent) = source.parent() {
            self.platform
                .probe_link(parent)
                .map_err(|e| MoveError::LinkCreateFailed {
                    link: source.clone(),
                    target: job.target_path.clone(),
                    reason: describe_io("create trial link", parent, &e),
                })?;
        }
        debug!(
            job = job.id,
            bytes = tally.bytes,
            files = tally.files,
            required = %format_bytes(required),
            available = %format_bytes(available),
            "pre-flight passed"
        );
        Ok(Preflight {
            tally,
            required,
            available,
            verdict,
        })
    }

    /// Walk the source for what would only fail after the copy: special files that
    /// cannot be copied, and directories the user cannot empty when removing the source.
    fn inspect_source(&self, source: &Path, cancel: Option<&CancelToken>) -> Result<(), MoveError> {
        for entry in WalkDir::new(source).follow_links(false) {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Err(MoveError::Cancelled);
            }
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                let io = e.into_io_error().unwrap_or_else(|| io::Error::other("filesystem loop"));
                copy_failed(&path, "inspect source", &io)
            })?;
            let ft = entry.file_type();
            if let Some(kind) = special_kind(&ft) {
                return Err(MoveError::UnsupportedEntry {
                    path: entry.into_path(),
                    kind: kind.to_string(),
                });
            }
            if ft.is_dir() && !self.platform.can_empty_dir(entry.path()) {
                debug!(dir = %entry.path().display(), "source directory cannot be emptied by this user");
                return Err(PolicyError::ElevationRequired {
                    path: entry.into_path(),
                }
                .into());
            }
        }
        Ok(())
    }

    pub(super) fn run(
        &self,
        slot: &Arc<JobSlot>,
        request: &MoveRequest,
    ) -> Result<MoveReport, MoveFailure> {
        match self.drive(slot, request) {
            Ok(moved) => Ok(self.complete(slot, moved)),
            Err(halt) => Err(self.halt(slot, halt)),
        }
    }

    fn transition(&self, slot: &JobSlot, to: MoveState) {
        let mut job = slot.job.write();
        let from = job.state;
        job.state = to;
        info!(job = job.id, from = %from, to = %to, "move state transition");
    }

    /// Record a cancellation that arrived during the irreversible phase.
    fn note_deferred_cancel(&self, slot: &JobSlot) {
        if slot.cancel.is_cancelled() {
            let mut job = slot.job.write();
            if !job.cancel_deferred {
                job.cancel_deferred = true;
                warn!(job = job.id, state = %job.state, "cancellation deferred until the move reaches a consistent state");
            }
        }
    }

    fn drive(&self, slot: &JobSlot, request: &MoveRequest) -> Result<TreeTally, Halt> {
        let job = slot.job.read().clone();
        let source = &job.source_path;
        let staging = &job.staging_path;
        let target = &job.target_path;

        let pf = self
            .preflight(&job, request.confirm, Some(&slot.cancel), true)
            .map_err(Halt::failed)?;
        slot.job.write().expected = Some(pf.tally);

        self.transition(slot, MoveState::Copying);
        if let Some(move_dir) = staging.parent() {
            let existed = move_dir.is_dir();
            fs::create_dir_all(move_dir)
                .map_err(|e| Halt::failed(copy_failed(move_dir, "create move directory", &e)))?;
            if !existed {
                slot.created_move_dir.store(true, Ordering::Relaxed);
            }
        }
        let opts = CopyOptions {
            cancel: slot.cancel.clone(),
            stall_timeout: self.settings.stall_timeout,
            preserve_metadata: self.settings.preserve_metadata,
            durability: self.settings.durability,
        };
        let copied = copy_tree(source, staging, &opts, &slot.progress)
            .map_err(|e| self.rollback(slot, e.into()))?;
        slot.job.write().bytes_copied = copied;

        self.transition(slot, MoveState::Verifying);
        if slot.cancel.is_cancelled() {
            return Err(self.rollback(slot, MoveError::Cancelled));
        }
        let expected = pf.tally;
        let current = tally_tree(source, Some(&slot.cancel))
            .map_err(|e| self.rollback(slot, tally_error(source, e)))?;
        let staged = tally_tree(staging, Some(&slot.cancel))
            .map_err(|e| self.rollback(slot, tally_error(staging, e)))?;
        // A source that changed since it was measured is as much a mismatch as a bad copy.
        let mismatch = if current != expected {
            Some(current)
        } else if staged != expected {
            Some(staged)
        } else {
            None
        };
        if let Some(actual) = mismatch {
            return Err(self.rollback(slot, MoveError::VerificationMismatch { expected, actual }));
        }
        if slot.cancel.is_cancelled() {
            return Err(self.rollback(slot, MoveError::Cancelled));
        }

        // Irreversible from here on.
        self.transition(slot, MoveState::SourceRemoving);
        if let Err(e) = force_remove_tree(source) {
            let intact = tally_tree(source, None).is_ok_and(|t| t == expected);
            let error = MoveError::SourceRemoveFailed {
                path: source.clone(),
                reason: describe_io("remove source", source, &e),
            };
            return Err(Halt::inconsistent(
                error,
                Inconsistency {
                    data_at: staging.clone(),
                    source_path: source.clone(),
                    source_state: if intact {
                        SourceState::Intact
                    } else {
                        SourceState::PartiallyRemoved
                    },
                    detail: "verified copy kept at the staging path; source deletion stopped".into(),
                },
            ));
        }
        self.note_deferred_cancel(slot);

        self.transition(slot, MoveState::Linking);
        if let Err(e) = try_atomic_move(staging, target) {
            return Err(Halt::inconsistent(
                MoveError::LinkCreateFailed {
                    link: source.clone(),
                    target: target.clone(),
                    reason: format!("{e:#}"),
                },
                Inconsistency {
                    data_at: staging.clone(),
                    source_path: source.clone(),
                    source_state: SourceState::LinkMissing,
                    detail: "staged copy could not be renamed to its final name".into(),
                },
            ));
        }
        if let Err(e) = self.platform.create_link(target, source) {
            return Err(Halt::inconsistent(
                MoveError::LinkCreateFailed {
                    link: source.clone(),
                    target: target.clone(),
                    reason: describe_io("create link", source, &e),
                },
                Inconsistency {
                    data_at: target.clone(),
                    source_path: source.clone(),
                    source_state: SourceState::LinkMissing,
                    detail: e.to_string(),
                },
            ));
        }
        self.note_deferred_cancel(slot);

        self.transition(slot, MoveState::LinkVerifying);
        self.verify_link(source, target, expected).map_err(|reason| {
            Halt::inconsistent(
                MoveError::LinkVerifyMismatch {
                    link: source.clone(),
                    reason: reason.clone(),
                },
                Inconsistency {
                    data_at: target.clone(),
                    source_path: source.clone(),
                    source_state: SourceState::LinkMalformed,
                    detail: reason,
                },
            )
        })?;
        self.note_deferred_cancel(slot);
        Ok(expected)
    }

    /// The link at `source` must resolve to `target` and expose the verified content.
    fn verify_link(&self, source: &Path, target: &Path, expected: TreeTally) -> Result<(), String> {
        let resolved = self
            .platform
            .resolve_link(source)
            .map_err(|e| describe_io("read link", source, &e))?;
        if comparable(&resolved) != comparable(target) {
            return Err(format!(
                "link points to {} instead of {}",
                resolved.display(),
                target.display()
            ));
        }
        let through_link = tally_tree(source, None).map_err(|e| describe_io("walk link", source, &e))?;
        if through_link != expected {
            return Err(format!(
                "content through link differs: expected {} files / {} bytes, found {} files / {} bytes",
                expected.files, expected.bytes, through_link.files, through_link.bytes
            ));
        }
        Ok(())
    }

    /// Delete the staging copy. The source has not been touched yet.
    fn rollback(&self, slot: &JobSlot, error: MoveError) -> Halt {
        let (id, staging, source) = {
            let job = slot.job.read();
            (job.id, job.staging_path.clone(), job.source_path.clone())
        };
        let wrote = fs::symlink_metadata(&staging).is_ok();
        let removed = force_remove_tree(&staging);
        if removed.is_ok() && slot.created_move_dir.load(Ordering::Relaxed) {
            self.remove_move_dir(id, &staging);
        }
        match removed {
            Ok(()) if wrote => {
                warn!(job = id, kind = error.kind(), error = %error, staging = %staging.display(), "move rolled back; staging copy removed");
                Halt {
                    error,
                    state: MoveState::RolledBack,
                    inconsistency: None,
                }
            }
            Ok(()) => Halt::failed(error),
            Err(e) => Halt::inconsistent(
                error,
                Inconsistency {
                    data_at: source.clone(),
                    source_path: source,
                    source_state: SourceState::Intact,
                    detail: describe_io("remove staging copy", &staging, &e),
                },
            ),
        }
    }

    /// Drop the move directory this job created, unless another job has put something in it.
    fn remove_move_dir(&self, id: u64, staging: &Path) {
        let Some(move_dir) = staging.parent() else {
            return;
        };
        match fs::remove_dir(move_dir) {
            Ok(()) => debug!(job = id, dir = %move_dir.display(), "removed empty move directory"),
            Err(e) => debug!(job = id, dir = %move_dir.display(), error = %e, "move directory kept"),
        }
    }

    fn complete(&self, slot: &JobSlot, moved: TreeTally) -> MoveReport {
        let job = {
            let mut job = slot.job.write();
            let from = job.state;
            job.state = MoveState::Completed;
            job.completed_at = Some(Utc::now());
            job.bytes_copied = job.bytes_copied.max(slot.progress.bytes());
            info!(job = job.id, from = %from, to = %job.state, bytes = moved.bytes, files = moved.files, "move completed");
            job.clone()
        };
        self.archive(&job);
        MoveReport { job, moved }
    }

    fn halt(&self, slot: &JobSlot, halt: Halt) -> MoveFailure {
        let job = {
            let mut job = slot.job.write();
            let from = job.state;
            job.state = halt.state;
            job.completed_at = Some(Utc::now());
            job.error = Some(halt.error.clone());
            job.inconsistency = halt.inconsistency;
            job.bytes_copied = job.bytes_copied.max(slot.progress.bytes());
            info!(job = job.id, from = %from, to = %job.state, "move state transition");
            job.clone()
        };
        match &job.inconsistency {
            Some(inc) => error!(
                job = job.id,
                kind = halt.error.kind(),
                code = halt.error.code(),
                error = %halt.error,
                "move left an inconsistent state; operator attention required: {inc}"
            ),
            None => warn!(job = job.id, kind = halt.error.kind(), error = %halt.error, state = %job.state, "move failed"),
        }
        self.archive(&job);
        MoveFailure {
            error: halt.error,
            job: Box::new(job),
        }
    }

    /// A request that never made it into the registry.
    fn reject(&self, mut job: MoveJob, error: MoveError) -> MoveFailure {
        job.state = MoveState::Failed;
        job.completed_at = Some(Utc::now());
        job.error = Some(error.clone());
        warn!(job = job.id, kind = error.kind(), error = %error, "move rejected");
        self.append_result(&job);
        MoveFailure {
            error,
            job: Box::new(job),
        }
    }

    pub(super) fn spawn_failure(&self, slot: &JobSlot, e: io::Error) -> MoveFailure {
        let source = slot.job.read().source_path.clone();
        self.halt(slot, Halt::failed(copy_failed(&source, "spawn move worker", &e)))
    }

    /// Drop a finished job from the registry and record it.
    fn archive(&self, job: &MoveJob) {
        self.registry.remove(job.id);
        self.append_result(job);
    }

    fn append_result(&self, job: &MoveJob) {
        if let Some(log) = &self.result_log
            && let Err(e) = log.append(&ResultEntry::from_job(job))
        {
            warn!(job = job.id, path = %log.path().display(), error = %e, "failed to append result log");
        }
    }
}
