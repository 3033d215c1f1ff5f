//! Thread-per-component runtime helpers.
//!
//! Every long-running component (segmenter, cloud workers, dispatch loop,
//! network client, camera) runs on its own named OS thread and executes an
//! unbounded polling loop.  This module provides the shared pieces:
//!
//! * [`StopToken`]: cooperative cancellation checked at each iteration.
//! * [`run_polling_loop`]: runs one iteration body at a time, backs off
//!   according to a [`PollPolicy`], and isolates failures so that neither an
//!   `Err` nor a panic in one iteration can silently end the thread.
//! * [`spawn_component`]: named thread wrapper whose [`ComponentThread`]
//!   handle logs how the component exited.
//!
//! # Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use voice_robot::worker::{run_polling_loop, Poll, PollPolicy, StopToken};
//!
//! let stop = StopToken::new();
//! let policy = PollPolicy::new(Duration::from_millis(200), Duration::from_millis(20));
//! run_polling_loop("example", &stop, policy, || {
//!     // do one unit of work
//!     Ok(Poll::Idle)
//! });
//! ```

pub mod stop;
pub mod thread;

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

pub use stop::StopToken;
pub use thread::{reap_finished, spawn_component, ComponentThread};

// ---------------------------------------------------------------------------
// Poll / PollPolicy
// ---------------------------------------------------------------------------

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Work was done; come back quickly.
    Busy,
    /// Nothing to do; back off.
    Idle,
}

/// Two-tier backoff: a long sleep when idle, a short yield when busy.
/// Failed iterations back off like idle ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub idle_sleep: Duration,
    pub busy_yield: Duration,
}

impl PollPolicy {
    pub fn new(idle_sleep: Duration, busy_yield: Duration) -> Self {
        Self {
            idle_sleep,
            busy_yield,
        }
    }

    fn pause_after(&self, outcome: Option<Poll>) -> Duration {
        match outcome {
            Some(Poll::Busy) => self.busy_yield,
            Some(Poll::Idle) | None => self.idle_sleep,
        }
    }
}

// ---------------------------------------------------------------------------
// run_polling_loop
// ---------------------------------------------------------------------------

/// Run `body` until `stop` is raised.
///
/// Errors are logged at `warn` and panics at `error`; in both cases the loop
/// carries on with the next iteration after an idle backoff.
pub fn run_polling_loop<F>(name: &str, stop: &StopToken, policy: PollPolicy, mut body: F)
where
    F: FnMut() -> anyhow::Result<Poll>,
{
    log::debug!("{name}: loop started");

    while !stop.is_stopped() {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(&mut body)) {
            Ok(Ok(poll)) => Some(poll),
            Ok(Err(e)) => {
                log::warn!("{name}: iteration failed: {e:#}");
                None
            }
            Err(payload) => {
                log::error!("{name}: iteration panicked: {}", panic_message(&payload));
                None
            }
        };

        if !stop.sleep(policy.pause_after(outcome)) {
            break;
        }
    }

    log::debug!("{name}: loop stopped");
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_policy() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::ZERO)
    }

    #[test]
    fn loop_runs_until_stopped() {
        let stop = StopToken::new();
        let mut iterations = 0;
        run_polling_loop("counter", &stop, instant_policy(), || {
            iterations += 1;
            if iterations == 5 {
                stop.stop();
            }
            Ok(Poll::Busy)
        });
        assert_eq!(iterations, 5);
    }

    #[test]
    fn errors_do_not_end_the_loop() {
        let stop = StopToken::new();
        let mut iterations = 0;
        run_polling_loop("flaky", &stop, instant_policy(), || {
            iterations += 1;
            if iterations == 3 {
                stop.stop();
                return Ok(Poll::Idle);
            }
            anyhow::bail!("transient failure {iterations}")
        });
        assert_eq!(iterations, 3);
    }

    #[test]
    fn panics_do_not_end_the_loop() {
        let stop = StopToken::new();
        let mut iterations = 0;
        run_polling_loop("panicky", &stop, instant_policy(), || {
            iterations += 1;
            if iterations == 1 {
                panic!("boom");
            }
            stop.stop();
            Ok(Poll::Idle)
        });
        assert_eq!(iterations, 2);
    }

    #[test]
    fn pre_stopped_token_skips_body() {
        let stop = StopToken::new();
        stop.stop();
        let mut ran = false;
        run_polling_loop("never", &stop, instant_policy(), || {
            ran = true;
            Ok(Poll::Idle)
        });
        assert!(!ran);
    }

    #[test]
    fn policy_pauses() {
        let policy = PollPolicy::new(Duration::from_millis(200), Duration::from_millis(50));
        assert_eq!(policy.pause_after(Some(Poll::Busy)), Duration::from_millis(50));
        assert_eq!(policy.pause_after(Some(Poll::Idle)), Duration::from_millis(200));
        assert_eq!(policy.pause_after(None), Duration::from_millis(200));
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&payload), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(&payload), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&payload), "non-string panic payload");
    }
}
