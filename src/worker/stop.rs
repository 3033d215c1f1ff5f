//! Cooperative cancellation shared by every component loop.
//!
//! [`StopToken`] is a cloneable flag.  Loops check it at each iteration
//! boundary and use [`StopToken::sleep`] for their poll backoff, which wakes
//! immediately when the token is raised instead of finishing the interval.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex, PoisonError,
};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cloneable cancellation flag.
///
/// ```rust
/// use std::time::Duration;
/// use voice_robot::worker::StopToken;
///
/// let stop = StopToken::new();
/// assert!(stop.sleep(Duration::from_millis(1)));
/// stop.stop();
/// assert!(stop.is_stopped());
/// assert!(!stop.sleep(Duration::from_secs(60))); // returns at once
/// ```
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<Inner>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every sleeper.
    pub fn stop(&self) {
        // Set under the lock so a sleeper between its check and its wait
        // cannot miss the notification.
        let _guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until stopped.  Returns `true` if the loop
    /// should keep running.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_stopped();
        }
        let guard = self.inner.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = self
            .inner
            .wake
            .wait_timeout_while(guard, duration, |_| !self.is_stopped())
            .unwrap_or_else(PoisonError::into_inner);
        !self.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn clones_share_the_flag() {
        let stop = StopToken::new();
        let clone = stop.clone();
        clone.stop();
        assert!(stop.is_stopped());
    }

    #[test]
    fn sleep_runs_full_interval_when_not_stopped() {
        let stop = StopToken::new();
        let started = Instant::now();
        assert!(stop.sleep(Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn stop_interrupts_sleep() {
        let stop = StopToken::new();
        let remote = stop.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.stop();
        });

        let started = Instant::now();
        assert!(!stop.sleep(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(10));
        handle.join().unwrap();
    }

    #[test]
    fn zero_sleep_reports_state() {
        let stop = StopToken::new();
        assert!(stop.sleep(Duration::ZERO));
        stop.stop();
        assert!(!stop.sleep(Duration::ZERO));
    }
}
