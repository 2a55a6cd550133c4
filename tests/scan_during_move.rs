//! A scan taken while a relocation is in flight flags the moving subtree stale instead
//! of sizing it; resuming after the job ends sizes it.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::Duration;
use tempfile::tempdir;

use cleanshift::engine::EngineSettings;
use cleanshift::{
    MoveError, MoveRequest, Platform, ProtectedTable, RankPolicy, RelocationEngine, SafetyPolicy,
    ScanOptions, rank, scan,
};

/// Holds the job in its last pre-flight step until released, then fails it.
struct Gate {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Platform for Gate {
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
        let _ = self.entered.lock().send(());
        let _ = self.release.lock().recv_timeout(Duration::from_secs(30));
        Err(io::Error::other("held"))
    }
}

fn filled(path: &Path, len: usize) {
    let mut x: u32 = 0x6b43_a9b5;
    let data: Vec<u8> = (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect();
    fs::write(path, data).unwrap();
}

#[test]
fn moving_subtree_is_stale_until_the_job_ends() {
    let home = tempdir().unwrap();
    let vol = tempdir().unwrap();
    let root = dunce::canonicalize(home.path()).unwrap();
    let src = root.join("cache");
    fs::create_dir_all(src.join("blobs")).unwrap();
    filled(&src.join("blobs/one"), 8192);
    fs::create_dir_all(root.join("docs")).unwrap();
    filled(&root.join("docs/notes"), 4096);

    let (entered_tx, entered_rx) = channel();
    let (release_tx, release_rx) = channel();
    let platform: Arc<dyn Platform> = Arc::new(Gate {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let safety = SafetyPolicy::new(ProtectedTable::empty(), platform.clone());
    let engine = RelocationEngine::new(
        EngineSettings::default(),
        Arc::new(SafetyPolicy::new(ProtectedTable::empty(), platform.clone())),
        platform,
    );

    let handle = engine.start(MoveRequest::new(&src, vol.path())).unwrap();
    entered_rx.recv_timeout(Duration::from_secs(30)).unwrap();

    let opts = ScanOptions {
        busy: Some(engine.registry().clone()),
        ..ScanOptions::default()
    };
    let mut index = scan(&root, &opts).unwrap();
    let busy = index.find(&src).unwrap();
    assert!(busy.stale);
    assert_eq!(busy.size_bytes, 0);
    assert_eq!(index.total_bytes(), 4096);

    let policy = RankPolicy {
        min_size_bytes: 1,
        ..Default::default()
    };
    let offered: Vec<_> = rank(&index, &policy, &safety)
        .into_iter()
        .map(|c| c.node.path)
        .collect();
    assert_eq!(offered, [root.join("docs")]);

    release_tx.send(()).unwrap();
    let failure = handle.wait().unwrap_err();
    assert!(matches!(failure.error, MoveError::LinkCreateFailed { .. }), "{:?}", failure.error);
    assert!(engine.registry().busy_with(&src).is_none());

    index.resume(&opts).unwrap();
    let resized = index.find(&src).unwrap();
    assert!(!resized.stale);
    assert_eq!(resized.size_bytes, 8192);
    assert_eq!(index.total_bytes(), 8192 + 4096);
    assert!(index.is_complete());
}
