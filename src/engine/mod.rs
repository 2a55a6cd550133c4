//! Relocation engine: moves a directory tree to another volume and leaves a link behind.
//!
//! Protocol: `Pending -> Copying -> Verifying -> SourceRemoving -> Linking ->
//! LinkVerifying -> Completed`. Every failure before `SourceRemoving` deletes the
//! staging copy and leaves the source untouched (`RolledBack`, or `Failed` when nothing
//! was written). Failures from `SourceRemoving` on are reported as an [`Inconsistency`]
//! naming where the data is, and are never retried.

mod job;
mod protocol;
mod registry;
mod result_log;

pub use job::{
    Inconsistency, JobId, MovePlan, MoveReport, MoveRequest, MoveJob, MoveState, SourceState,
};
pub use registry::JobRegistry;
pub use result_log::{ResultEntry, ResultLog};

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

use crate::errors::MoveFailure;
use crate::fs_ops::DurabilityMode;
use crate::platform::Platform;
use crate::safety::SafetyPolicy;
use crate::shutdown::CancelToken;
use registry::JobSlot;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Directory created on the target volume to hold relocated trees.
    pub move_dir_name: String,
    /// Free-space headroom demanded on top of the source size.
    pub space_margin_percent: u32,
    /// A copy with no progress for this long fails as `Timeout`.
    pub stall_timeout: Duration,
    pub preserve_metadata: bool,
    pub durability: DurabilityMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            move_dir_name: "CleanShift_Moved".to_string(),
            space_margin_percent: 5,
            stall_timeout: Duration::from_secs(60),
            preserve_metadata: true,
            durability: DurabilityMode::Full,
        }
    }
}

#[derive(Clone)]
pub struct RelocationEngine {
    settings: EngineSettings,
    safety: Arc<SafetyPolicy>,
    platform: Arc<dyn Platform>,
    registry: JobRegistry,
    result_log: Option<ResultLog>,
}

impl fmt::Debug for RelocationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelocationEngine")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("result_log", &self.result_log)
            .finish_non_exhaustive()
    }
}

impl RelocationEngine {
    pub fn new(
        settings: EngineSettings,
        safety: Arc<SafetyPolicy>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        Self {
            settings,
            safety,
            platform,
            registry: JobRegistry::new(),
            result_log: None,
        }
    }

    pub fn with_result_log(mut self, log: ResultLog) -> Self {
        self.result_log = Some(log);
        self
    }

    /// Share an existing registry (e.g. the one handed to scans as `busy`).
    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run a relocation to completion on the calling thread.
    pub fn relocate(
        &self,
        request: MoveRequest,
        cancel: CancelToken,
    ) -> Result<MoveReport, MoveFailure> {
        let slot = self.admit(&request, cancel)?;
        self.run(&slot, &request)
    }

    /// Admit a relocation and run it on a worker thread. Overlap with an in-flight
    /// job is rejected here, before the thread starts.
    pub fn start(&self, request: MoveRequest) -> Result<JobHandle, MoveFailure> {
        let slot = self.admit(&request, CancelToken::new())?;
        let engine = self.clone();
        let worker_slot = slot.clone();
        let id = slot.job.read().id;
        let thread = thread::Builder::new()
            .name(format!("cleanshift-move-{id}"))
            .spawn(move || engine.run(&worker_slot, &request))
            .map_err(|e| self.spawn_failure(&slot, e))?;
        info!(job = id, "relocation started in background");
        Ok(JobHandle { id, slot, thread })
    }

    /// Request cancellation of an in-flight job. Returns false for unknown/finished ids.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.registry.slot(id) {
            Some(slot) => {
                slot.cancel.cancel();
                info!(job = id, "cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Snapshot of an in-flight job. Finished jobs are archived to the result log.
    pub fn status(&self, id: JobId) -> Option<MoveJob> {
        self.registry.slot(id).map(|s| s.snapshot())
    }

    pub fn in_flight(&self) -> Vec<MoveJob> {
        self.registry.snapshot()
    }
}

/// Handle to a relocation running on a worker thread.
pub struct JobHandle {
    id: JobId,
    slot: Arc<JobSlot>,
    thread: thread::JoinHandle<Result<MoveReport, MoveFailure>>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Latest job record (also valid after the job finished).
    pub fn status(&self) -> MoveJob {
        self.slot.snapshot()
    }

    pub fn cancel(&self) {
        self.slot.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Block until the job reaches a terminal state.
    pub fn wait(self) -> Result<MoveReport, MoveFailure> {
        match self.thread.join() {
            Ok(res) => res,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{MoveError, PolicyError};
    use crate::fs_ops::tally_tree;
    use crate::safety::{ProtectedTable, ReasonCode};
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};
    use tempfile::{TempDir, tempdir};

    /// Treats every directory as its own volume and never reports process references.
    #[derive(Default)]
    struct TwoVolumes {
        free: Option<u64>,
        cancel_on_link_check: Option<CancelToken>,
    }

    impl Platform for TwoVolumes {
        fn same_volume(&self, _: &Path, _: &Path) -> io::Result<bool> {
            Ok(false)
        }
        fn processes_using(&self, _: &Path) -> Vec<u32> {
            Vec::new()
        }
        fn needs_elevation(&self, _: &Path) -> bool {
            false
        }
        fn free_bytes(&self, volume: &Path) -> io::Result<u64> {
            match self.free {
                Some(n) => Ok(n),
                None => crate::platform::NativePlatform.free_bytes(volume),
            }
        }
        fn probe_link(&self, _: &Path) -> io::Result<()> {
            if let Some(t) = &self.cancel_on_link_check {
                t.cancel();
            }
            Ok(())
        }
    }

    struct Fixture {
        _home: TempDir,
        vol: TempDir,
        source: PathBuf,
    }

    fn fixture() -> Fixture {
        let home = tempdir().unwrap();
        let vol = tempdir().unwrap();
        let source = home.path().join("cache");
        fs::create_dir_all(source.join("pkg/lib")).unwrap();
        fs::write(source.join("pkg/lib/a.bin"), vec![7u8; 4096]).unwrap();
        fs::write(source.join("pkg/readme"), b"hello").unwrap();
        fs::write(source.join("top"), b"x").unwrap();
        Fixture {
            _home: home,
            vol,
            source,
        }
    }

    fn engine_with(platform: TwoVolumes, settings: EngineSettings) -> RelocationEngine {
        let platform: Arc<dyn Platform> = Arc::new(platform);
        let safety = Arc::new(SafetyPolicy::new(ProtectedTable::empty(), platform.clone()));
        RelocationEngine::new(settings, safety, platform)
    }

    fn engine(platform: TwoVolumes) -> RelocationEngine {
        engine_with(
            platform,
            EngineSettings {
                durability: DurabilityMode::Data,
                ..EngineSettings::default()
            },
        )
    }

    fn moved_dir(f: &Fixture) -> PathBuf {
        f.vol.path().join("CleanShift_Moved")
    }

    #[cfg(unix)]
    #[test]
    fn completed_move_leaves_resolving_link() {
        let f = fixture();
        let before = tally_tree(&f.source, None).unwrap();
        let log_dir = tempdir().unwrap();
        let log = ResultLog::new(log_dir.path().join("results.jsonl"));
        let eng = engine(TwoVolumes::default()).with_result_log(log.clone());

        let report = eng
            .relocate(MoveRequest::new(&f.source, f.vol.path()), CancelToken::new())
            .unwrap();

        assert_eq!(report.job.state, MoveState::Completed);
        assert_eq!(report.moved, before);
        let target = moved_dir(&f).join("cache");
        assert_eq!(report.job.target_path, target);
        assert!(fs::symlink_metadata(&f.source).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&f.source).unwrap(), target);
        assert_eq!(tally_tree(&f.source, None).unwrap(), before);
        // Only the final directory remains in the move dir; staging was renamed away.
        assert_eq!(fs::read_dir(moved_dir(&f)).unwrap().count(), 1);
        assert!(eng.in_flight().is_empty());

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].final_state, MoveState::Completed);
        assert_eq!(entries[0].bytes_moved, before.bytes);
    }

    #[test]
    fn missing_source_fails_without_writing() {
        let f = fixture();
        let eng = engine(TwoVolumes::default());
        let failure = eng
            .relocate(
                MoveRequest::new(f.source.join("nope"), f.vol.path()),
                CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(failure.error, MoveError::SourceNotFound(_)));
        assert_eq!(failure.state(), MoveState::Failed);
        assert!(failure.is_recoverable());
        assert!(!moved_dir(&f).exists());
    }

    #[test]
    fn insufficient_space_is_detected_before_copying() {
        let f = fixture();
        let eng = engine(TwoVolumes {
            free: Some(100),
            ..Default::default()
        });
        let failure = eng
            .relocate(MoveRequest::new(&f.source, f.vol.path()), CancelToken::new())
            .unwrap_err();
        match failure.error {
            MoveError::InsufficientSpace {
                required,
                available,
                ..
            } => {
                assert_eq!(available, 100);
                assert_eq!(required, crate::utils::with_margin(4096 + 5 + 1, 5));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!moved_dir(&f).exists());
        assert!(f.source.join("top").is_file());
    }

    #[test]
    fn stalled_copy_rolls_back() {
        let f = fixture();
        let eng = engine_with(
            TwoVolumes::default(),
            EngineSettings {
                stall_timeout: Duration::ZERO,
                durability: DurabilityMode::Data,
                ..EngineSettings::default()
            },
        );
        let failure = eng
            .relocate(MoveRequest::new(&f.source, f.vol.path()), CancelToken::new())
            .unwrap_err();
        assert!(matches!(failure.error, MoveError::Timeout { .. }), "{:?}", failure.error);
        assert_eq!(failure.state(), MoveState::RolledBack);
        assert!(!failure.job.staging_path.exists());
        assert!(!moved_dir(&f).exists());
        assert!(f.source.join("pkg/lib/a.bin").is_file());
    }

    #[test]
    fn cancel_during_copy_rolls_back() {
        let f = fixture();
        let token = CancelToken::new();
        let eng = engine(TwoVolumes {
            cancel_on_link_check: Some(token.clone()),
            ..Default::default()
        });
        let failure = eng
            .relocate(MoveRequest::new(&f.source, f.vol.path()), token)
            .unwrap_err();
        assert_eq!(failure.error, MoveError::Cancelled);
        assert_eq!(failure.state(), MoveState::RolledBack);
        assert!(!failure.job.staging_path.exists());
        assert!(!fs::symlink_metadata(&f.source).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(f.source.join("pkg/readme")).unwrap(), b"hello");
    }

    #[test]
    fn overlapping_request_is_rejected_while_first_is_in_flight() {
        let f = fixture();
        let eng = engine(TwoVolumes::default());
        let first = MoveRequest::new(&f.source, f.vol.path());
        let slot = eng.admit(&first, CancelToken::new()).unwrap();
        let failure = eng
            .relocate(
                MoveRequest::new(f.source.join("pkg"), f.vol.path()),
                CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(failure.error, MoveError::PathBusy { .. }));
        let id = slot.job.read().id;
        assert_eq!(eng.status(id).map(|j| j.state), Some(MoveState::Pending));
        assert!(eng.cancel(id));
        assert!(!eng.cancel(id + 100));
    }

    #[test]
    fn plan_reports_paths_and_writes_nothing() {
        let f = fixture();
        let eng = engine(TwoVolumes {
            free: Some(u64::MAX),
            ..Default::default()
        });
        let plan = eng.plan(&MoveRequest::new(&f.source, f.vol.path())).unwrap();
        assert_eq!(plan.target_path, moved_dir(&f).join("cache"));
        assert_eq!(plan.link_path, plan.source_path);
        assert_eq!(plan.tally.files, 3);
        assert_eq!(plan.required_bytes, plan.tally.with_margin(5));
        assert!(plan.staging_path.starts_with(moved_dir(&f)));
        assert!(!moved_dir(&f).exists());
        assert!(eng.in_flight().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn filesystem_root_is_refused() {
        let vol = tempdir().unwrap();
        let eng = engine(TwoVolumes::default());
        let failure = eng
            .relocate(MoveRequest::new("/", vol.path()), CancelToken::new())
            .unwrap_err();
        assert_eq!(
            failure.error,
            MoveError::Policy(PolicyError::Protected {
                path: PathBuf::from("/"),
                reason: ReasonCode::VolumeRoot,
            })
        );
    }

    #[test]
    fn existing_target_is_refused() {
        let f = fixture();
        fs::create_dir_all(moved_dir(&f).join("cache")).unwrap();
        let eng = engine(TwoVolumes::default());
        let failure = eng
            .relocate(MoveRequest::new(&f.source, f.vol.path()), CancelToken::new())
            .unwrap_err();
        assert!(matches!(failure.error, MoveError::TargetExists(_)));
    }

    #[cfg(unix)]
    #[test]
    fn background_job_can_be_waited_on() {
        let f = fixture();
        let eng = engine(TwoVolumes::default());
        let handle = eng.start(MoveRequest::new(&f.source, f.vol.path())).unwrap();
        let id = handle.id();
        let report = handle.wait().unwrap();
        assert_eq!(report.job.id, id);
        assert_eq!(report.job.state, MoveState::Completed);
        assert!(eng.status(id).is_none());
    }
}
