//! In-flight job registry.
//!
//! The only mutable state shared between concurrent moves and scans. One `RwLock`
//! guards the map: admission takes the write lock (overlap check and insert are one
//! step), status queries and scans take the read lock. Each slot's job record has its
//! own lock so the worker can publish state changes without blocking the map.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::job::{JobId, MoveJob};
use crate::errors::MoveError;
use crate::fs_ops::CopyProgress;
use crate::shutdown::CancelToken;
use crate::utils::{fold_case, paths_overlap};

/// Paths a job owns, in comparable form (see [`crate::utils::comparable`]).
#[derive(Debug, Clone)]
pub(crate) struct JobKeys {
    pub source: PathBuf,
    /// Final target path.
    pub target: PathBuf,
    /// Private to the job, so only scans check it.
    pub staging: PathBuf,
}

pub(crate) struct JobSlot {
    pub keys: JobKeys,
    pub job: RwLock<MoveJob>,
    pub cancel: CancelToken,
    pub progress: CopyProgress,
    /// The job created the move directory on the target volume.
    pub created_move_dir: AtomicBool,
}

impl JobSlot {
    /// Current record with the live copy counter folded in.
    pub fn snapshot(&self) -> MoveJob {
        let mut job = self.job.read().clone();
        job.bytes_copied = job.bytes_copied.max(self.progress.bytes());
        job
    }
}

#[derive(Default)]
struct Inner {
    next_id: JobId,
    jobs: HashMap<JobId, Arc<JobSlot>>,
}

/// Cloneable handle; all clones share one registry.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("in_flight", &self.inner.read().jobs.len())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn allocate_id(&self) -> JobId {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        inner.next_id
    }

    fn conflict_in(inner: &Inner, keys: &JobKeys) -> Option<(JobId, PathBuf)> {
        inner.jobs.iter().find_map(|(id, slot)| {
            [&keys.source, &keys.target]
                .into_iter()
                .find(|mine| {
                    paths_overlap(mine, &slot.keys.source) || paths_overlap(mine, &slot.keys.target)
                })
                .map(|p| (*id, p.clone()))
        })
    }

    /// In-flight job whose source or target overlaps `keys`, without admitting anything.
    pub(crate) fn conflict(&self, keys: &JobKeys) -> Option<(JobId, PathBuf)> {
        Self::conflict_in(&self.inner.read(), keys)
    }

    /// Admit a job unless its paths overlap an in-flight one.
    pub(crate) fn admit(
        &self,
        keys: JobKeys,
        job: MoveJob,
        cancel: CancelToken,
    ) -> Result<Arc<JobSlot>, MoveError> {
        let mut inner = self.inner.write();
        if let Some((other, path)) = Self::conflict_in(&inner, &keys) {
            return Err(MoveError::PathBusy { path, job: other });
        }
        let slot = Arc::new(JobSlot {
            keys,
            job: RwLock::new(job),
            cancel,
            progress: CopyProgress::default(),
            created_move_dir: AtomicBool::new(false),
        });
        let id = slot.job.read().id;
        inner.jobs.insert(id, slot.clone());
        Ok(slot)
    }

    pub(crate) fn remove(&self, id: JobId) {
        self.inner.write().jobs.remove(&id);
    }

    pub(crate) fn slot(&self, id: JobId) -> Option<Arc<JobSlot>> {
        self.inner.read().jobs.get(&id).cloned()
    }

    /// The in-flight job whose source or target tree contains `path`, if any.
    pub fn busy_with(&self, path: &Path) -> Option<JobId> {
        let p = fold_case(path);
        let inner = self.inner.read();
        inner
            .jobs
            .iter()
            .find(|(_, s)| {
                [&s.keys.source, &s.keys.target, &s.keys.staging]
                    .into_iter()
                    .any(|k| p.starts_with(k))
            })
            .map(|(id, _)| *id)
    }

    pub fn snapshot(&self) -> Vec<MoveJob> {
        let mut jobs: Vec<MoveJob> = self.inner.read().jobs.values().map(|s| s.snapshot()).collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    pub fn len(&self) -> usize {
        self.inner.read().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
