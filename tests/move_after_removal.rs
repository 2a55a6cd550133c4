//! Failures once the source has been removed are reported, never rolled back; the
//! inconsistency names where the data is. Also covers cancellation arriving late and
//! a source that changes while it is being copied.

#![cfg(unix)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

use cleanshift::engine::{EngineSettings, SourceState};
use cleanshift::fs_ops::{DurabilityMode, TreeTally, tally_tree};
use cleanshift::{
    CancelToken, MoveError, MoveRequest, MoveState, Platform, ProtectedTable, RelocationEngine,
    ResultLog, SafetyPolicy,
};

#[derive(Default)]
struct Fake {
    /// Refuse to create the final link.
    refuse_link: bool,
    /// Report links as pointing here.
    resolve_to: Option<PathBuf>,
    /// Cancelled just before the link is created.
    cancel_at_link: Option<CancelToken>,
    /// Written into the source during the last pre-flight step.
    late_file: Option<PathBuf>,
}

impl Platform for Fake {
    fn same_volume(&self, _: &Path, _: &Path) -> io::Result<bool> {
        Ok(false)
    }
    fn processes_using(&self, _: &Path) -> Vec<u32> {
        Vec::new()
    }
    fn needs_elevation(&self, _: &Path) -> bool {
        false
    }
    fn free_bytes(&self, _: &Path) -> io::Result<u64> {
        Ok(u64::MAX)
    }
    fn probe_link(&self, _: &Path) -> io::Result<()> {
        if let Some(f) = &self.late_file {
            fs::write(f, b"appeared after measuring")?;
        }
        Ok(())
    }
    fn create_link(&self, target: &Path, link: &Path) -> io::Result<()> {
        if self.refuse_link {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if let Some(token) = &self.cancel_at_link {
            token.cancel();
        }
        std::os::unix::fs::symlink(target, link)
    }
    fn resolve_link(&self, link: &Path) -> io::Result<PathBuf> {
        match &self.resolve_to {
            Some(p) => Ok(p.clone()),
            None => fs::read_link(link),
        }
    }
}

struct Setup {
    _home: TempDir,
    vol: TempDir,
    logs: TempDir,
    src: PathBuf,
    before: TreeTally,
}

impl Setup {
    fn new() -> Self {
        let home = tempdir().unwrap();
        let src = home.path().join("cache");
        fs::create_dir_all(src.join("objects/aa")).unwrap();
        fs::write(src.join("objects/aa/0001"), vec![7u8; 40_000]).unwrap();
        fs::write(src.join("index"), b"idx").unwrap();
        let before = tally_tree(&src, None).unwrap();
        Self {
            _home: home,
            vol: tempdir().unwrap(),
            logs: tempdir().unwrap(),
            src,
            before,
        }
    }

    fn target(&self) -> PathBuf {
        self.vol.path().join("CleanShift_Moved").join("cache")
    }

    fn log(&self) -> ResultLog {
        ResultLog::new(self.logs.path().join("moves.jsonl"))
    }

    fn engine(&self, fake: Fake) -> RelocationEngine {
        let platform: Arc<dyn Platform> = Arc::new(fake);
        let safety = Arc::new(SafetyPolicy::new(ProtectedTable::empty(), platform.clone()));
        let settings = EngineSettings {
            durability: DurabilityMode::Data,
            ..EngineSettings::default()
        };
        RelocationEngine::new(settings, safety, platform).with_result_log(self.log())
    }

    fn request(&self) -> MoveRequest {
        MoveRequest::new(&self.src, self.vol.path())
    }
}

#[test]
fn refused_link_leaves_data_at_target_and_no_link() {
    let s = Setup::new();
    let failure = s
        .engine(Fake {
            refuse_link: true,
            ..Fake::default()
        })
        .relocate(s.request(), CancelToken::new())
        .unwrap_err();

    assert!(matches!(failure.error, MoveError::LinkCreateFailed { .. }), "{:?}", failure.error);
    assert_eq!(failure.state(), MoveState::Failed);
    assert!(!failure.is_recoverable());
    let inc = failure.job.inconsistency.as_ref().unwrap();
    assert_eq!(inc.data_at, s.target());
    assert_eq!(inc.source_path, s.src);
    assert_eq!(inc.source_state, SourceState::LinkMissing);

    assert!(fs::symlink_metadata(&s.src).is_err());
    assert_eq!(tally_tree(&s.target(), None).unwrap(), s.before);

    let entries = s.log().read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].final_state, MoveState::Failed);
    assert_eq!(entries[0].inconsistency.as_ref(), Some(inc));
}

#[test]
fn link_resolving_elsewhere_is_reported_malformed() {
    let s = Setup::new();
    let failure = s
        .engine(Fake {
            resolve_to: Some(PathBuf::from("/somewhere/else")),
            ..Fake::default()
        })
        .relocate(s.request(), CancelToken::new())
        .unwrap_err();

    match &failure.error {
        MoveError::LinkVerifyMismatch { link, reason } => {
            assert_eq!(link, &s.src);
            assert!(reason.contains("/somewhere/else"), "{reason}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(failure.state(), MoveState::Failed);
    let inc = failure.job.inconsistency.as_ref().unwrap();
    assert_eq!(inc.data_at, s.target());
    assert_eq!(inc.source_state, SourceState::LinkMalformed);
    // The real link is in place; only its verification failed.
    assert_eq!(fs::read_link(&s.src).unwrap(), s.target());

    let entries = s.log().read_all().unwrap();
    assert_eq!(entries[0].final_state, MoveState::Failed);
    assert_eq!(
        entries[0].inconsistency.as_ref().map(|i| i.source_state),
        Some(SourceState::LinkMalformed)
    );
}

#[test]
fn cancel_after_source_removal_is_deferred_to_completion() {
    let s = Setup::new();
    let token = CancelToken::new();
    let report = s
        .engine(Fake {
            cancel_at_link: Some(token.clone()),
            ..Fake::default()
        })
        .relocate(s.request(), token.clone())
        .unwrap();

    assert!(token.is_cancelled());
    assert_eq!(report.job.state, MoveState::Completed);
    assert!(report.job.cancel_deferred);
    assert!(report.job.inconsistency.is_none());
    assert_eq!(fs::read_link(&s.src).unwrap(), s.target());
    assert_eq!(tally_tree(&s.src, None).unwrap(), s.before);

    let entries = s.log().read_all().unwrap();
    assert_eq!(entries[0].final_state, MoveState::Completed);
}

#[test]
fn source_changed_after_measuring_rolls_back() {
    let s = Setup::new();
    let late = s.src.join("objects/late");
    let failure = s
        .engine(Fake {
            late_file: Some(late.clone()),
            ..Fake::default()
        })
        .relocate(s.request(), CancelToken::new())
        .unwrap_err();

    match &failure.error {
        MoveError::VerificationMismatch { expected, actual } => {
            assert_eq!(*expected, s.before);
            assert_eq!(actual.files, s.before.files + 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(failure.state(), MoveState::RolledBack);
    assert!(failure.is_recoverable());
    assert!(!failure.job.staging_path.exists());
    assert!(!s.vol.path().join("CleanShift_Moved").exists());
    assert!(!fs::symlink_metadata(&s.src).unwrap().file_type().is_symlink());
    assert!(late.is_file());

    let entries = s.log().read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].final_state, MoveState::RolledBack);
    assert!(entries[0].inconsistency.is_none());
}
