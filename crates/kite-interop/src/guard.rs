//! Guard timer
//!
//! A watchdog that bounds total run time. When the deadline passes
//! before the battery completes, the process prints a fixed timeout
//! message and exits with status 1, bypassing teardown: a firing guard
//! means something is deadlocked, and graceful shutdown cannot be
//! trusted at that point.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::PROGRAM;

/// Guard bound for a normal run.
pub const GUARD_TIMEOUT: Duration = Duration::from_secs(120);

/// Guard bound when expensive checks are enabled; expensive scenarios
/// legitimately take longer, so the watchdog allows more time.
pub const GUARD_TIMEOUT_EXPENSIVE: Duration = Duration::from_secs(240);

struct GuardState {
    disarmed: Mutex<bool>,
    condvar: Condvar,
}

/// An armed watchdog. Dropping it disarms the deadline.
pub struct GuardTimer {
    state: Arc<GuardState>,
    watcher: Option<JoinHandle<()>>,
}

impl GuardTimer {
    /// Arm a one-shot deadline that kills the process on expiry.
    pub fn arm(timeout: Duration) -> Self {
        Self::arm_with(timeout, || {
            eprintln!("{}: FAIL! test timeout!", PROGRAM);
            std::process::exit(1);
        })
    }

    /// Arm with a custom expiry action. The action runs at most once,
    /// on the watcher thread.
    pub fn arm_with(timeout: Duration, on_expire: impl FnOnce() + Send + 'static) -> Self {
        let state = Arc::new(GuardState {
            disarmed: Mutex::new(false),
            condvar: Condvar::new(),
        });

        let watcher_state = Arc::clone(&state);
        let watcher = std::thread::spawn(move || {
            let deadline = Instant::now() + timeout;
            let mut disarmed = watcher_state.disarmed.lock();
            while !*disarmed {
                if Instant::now() >= deadline {
                    drop(disarmed);
                    on_expire();
                    return;
                }
                watcher_state.condvar.wait_until(&mut disarmed, deadline);
            }
        });

        Self {
            state,
            watcher: Some(watcher),
        }
    }

    /// Disarm the deadline; the watcher thread exits.
    pub fn disarm(self) {
        // Drop impl does the work.
    }
}

impl Drop for GuardTimer {
    fn drop(&mut self) {
        {
            let mut disarmed = self.state.disarmed.lock();
            *disarmed = true;
            self.state.condvar.notify_all();
        }
        if let Some(watcher) = self.watcher.take() {
            let _ = watcher.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[test]
    fn disarm_prevents_expiry() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let guard = GuardTimer::arm_with(Duration::from_millis(40), move || {
            flag.store(true, Ordering::SeqCst);
        });

        guard.disarm();
        std::thread::sleep(Duration::from_millis(80));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn expiry_fires_once_when_not_disarmed() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let guard = GuardTimer::arm_with(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst));
        drop(guard);
    }

    #[test]
    fn expensive_bound_is_the_longer_one() {
        assert!(GUARD_TIMEOUT_EXPENSIVE > GUARD_TIMEOUT);
    }
}
