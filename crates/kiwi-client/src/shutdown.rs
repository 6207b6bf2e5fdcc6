//! Process-wide run flag and the per-worker wake event used to make every
//! blocking sleep interruptible.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Shared across every worker thread. Cleared once, by the first fatal
/// error or by Ctrl-C, and never set again. Also fans `clear()` out to
/// every worker's [`WakeEvent`] so a sleeping worker is interrupted
/// immediately instead of waiting out its full backoff — without this, a
/// worker mid-way through a 15s reconnect sleep would not notice shutdown
/// until the sleep elapsed, violating the bounded-cancellation invariant.
#[derive(Clone)]
pub struct RunFlag(Arc<RunFlagInner>);

struct RunFlagInner {
    running: AtomicBool,
    wakers: Mutex<Vec<Weak<WakeEvent>>>,
}

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(RunFlagInner {
            running: AtomicBool::new(true),
            wakers: Mutex::new(Vec::new()),
        }))
    }

    pub fn is_running(&self) -> bool {
        self.0.running.load(Ordering::Relaxed)
    }

    /// Registers a worker's wake event so it is woken when the flag clears.
    pub fn register(&self, wake: &Arc<WakeEvent>) {
        self.0.wakers.lock().push(Arc::downgrade(wake));
    }

    pub fn clear(&self) {
        self.0.running.store(false, Ordering::Relaxed);
        let wakers = self.0.wakers.lock();
        for weak in wakers.iter() {
            if let Some(wake) = weak.upgrade() {
                wake.wake();
            }
        }
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs a Ctrl-C handler that clears `run_flag` exactly once.
pub fn install_ctrlc_handler(run_flag: RunFlag) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested");
        run_flag.clear();
    })?;
    Ok(())
}

/// One worker's private wake handle: lets a sleeping worker be woken up
/// immediately instead of waiting out a full 5s/15s backoff.
pub struct WakeEvent {
    woken: Mutex<bool>,
    condvar: Condvar,
}

impl WakeEvent {
    pub fn new() -> Self {
        Self {
            woken: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Sleeps for up to `timeout`, returning early (with `true`) if
    /// [`WakeEvent::wake`] is called first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut woken = self.woken.lock();
        if *woken {
            *woken = false;
            return true;
        }
        let result = self.condvar.wait_for(&mut woken, timeout);
        let was_woken = *woken;
        *woken = false;
        !result.timed_out() || was_woken
    }

    pub fn wake(&self) {
        let mut woken = self.woken.lock();
        *woken = true;
        self.condvar.notify_all();
    }
}

impl Default for WakeEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn run_flag_starts_true_and_clears_once() {
        let flag = RunFlag::new();
        assert!(flag.is_running());
        flag.clear();
        assert!(!flag.is_running());
    }

    #[test]
    fn wake_event_returns_early_when_woken_from_another_thread() {
        let event = Arc::new(WakeEvent::new());
        let event2 = event.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            event2.wake();
        });
        let woke_early = event.wait_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(woke_early);
    }

    #[test]
    fn wake_event_times_out_when_never_woken() {
        let event = WakeEvent::new();
        let woke_early = event.wait_timeout(Duration::from_millis(30));
        assert!(!woke_early);
    }

    #[test]
    fn clearing_the_run_flag_wakes_every_registered_worker() {
        let flag = RunFlag::new();
        let a = Arc::new(WakeEvent::new());
        let b = Arc::new(WakeEvent::new());
        flag.register(&a);
        flag.register(&b);

        let flag2 = flag.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            flag2.clear();
        });

        let woke_a = a.wait_timeout(Duration::from_secs(5));
        let woke_b = b.wait_timeout(Duration::from_secs(5));
        handle.join().unwrap();
        assert!(woke_a);
        assert!(woke_b);
        assert!(!flag.is_running());
    }
}
