//! Cooperative cancellation.
//!
//! Two layers:
//! - a process-wide shutdown flag set by the ctrlc handler (SIGINT/SIGTERM);
//! - per-operation [`CancelToken`]s handed to scans and moves.
//!
//! A token reports cancelled when either its own flag or the process-wide flag is set,
//! so a Ctrl-C reaches every running scan and move without extra plumbing.
//!
//! Notes:
//! - Relaxed atomics are sufficient for a one-way "stop" flag.
//! - `request()` is safe to call from signal handlers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a cooperative shutdown (idempotent).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Check whether a shutdown has been requested.
#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Cloneable cancellation handle. All clones share one flag.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    process: &'static AtomicBool,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            process: &SHUTDOWN,
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every operation holding a clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// True once `cancel()` was called on any clone, or a process shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.process.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn process_flag_cancels_every_token() {
        // A private stand-in for SHUTDOWN so other tests never observe the flag.
        static FAKE_SHUTDOWN: AtomicBool = AtomicBool::new(false);
        let t = CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            process: &FAKE_SHUTDOWN,
        };
        let other = CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
            process: &FAKE_SHUTDOWN,
        };
        FAKE_SHUTDOWN.store(true, Ordering::Relaxed);
        assert!(t.is_cancelled());
        assert!(other.is_cancelled());
    }
}
