//! Startup readiness barrier over `running_components`.
//!
//! Components register themselves once their startup succeeded.  The
//! supervisor announces each component it spawns with
//! [`Broker::expect_component`] beforehand, so one whose startup fails is
//! still counted.  [`ReadinessBarrier::wait`] polls the size of
//! `running_components` against the broker's expected component count at a
//! fixed interval, for a bounded number of attempts.  Timing out is not an
//! error: the caller gets a [`ReadinessReport`] naming the components that
//! were expected or registered at some point but are not running now, and
//! carries on in a degraded mode.
//!
//! A component that registers after the window closes is reported missing
//! even though it eventually starts.

use std::fmt;
use std::time::Duration;

use super::{Broker, ComponentId, RunningComponents};
use crate::worker::StopToken;

// ---------------------------------------------------------------------------
// ReadinessReport
// ---------------------------------------------------------------------------

/// Outcome of a readiness wait.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadinessReport {
    /// `expected_component_number` at the last poll.
    pub expected: usize,
    /// Size of `running_components` at the last poll.
    pub running: usize,
    /// Registered components absent from `running_components`, sorted.
    pub missing: Vec<ComponentId>,
    /// Polls performed.
    pub attempts: u32,
}

impl ReadinessReport {
    /// `true` when every registered component was running and at least one
    /// component had registered.
    pub fn is_ready(&self) -> bool {
        self.expected > 0 && self.running >= self.expected && self.missing.is_empty()
    }
}

impl fmt::Display for ReadinessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} components running after {} attempt(s)",
            self.running, self.expected, self.attempts
        )?;
        if !self.missing.is_empty() {
            let names: Vec<&str> = self.missing.iter().map(ComponentId::as_str).collect();
            write!(f, "; missing: {}", names.join(", "))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReadinessBarrier
// ---------------------------------------------------------------------------

/// Bounded-retry soft barrier.
#[derive(Debug, Clone)]
pub struct ReadinessBarrier {
    interval: Duration,
    max_attempts: u32,
}

impl ReadinessBarrier {
    /// `max_attempts` is clamped to at least one poll.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Poll until every registered component is running, the attempts run
    /// out, or `stop` is raised.
    pub fn wait(&self, broker: &Broker, stop: &StopToken) -> ReadinessReport {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let report = Self::inspect(broker, attempts);
            if report.is_ready() {
                log::info!("readiness: {report}");
                return report;
            }
            if attempts >= self.max_attempts || !stop.sleep(self.interval) {
                log::warn!("readiness: setup incomplete, continuing degraded ({report})");
                return report;
            }
            log::debug!("readiness: waiting ({report})");
        }
    }

    /// Single poll of the broker's registration state.
    pub fn inspect(broker: &Broker, attempts: u32) -> ReadinessReport {
        let expected = broker.expected_component_number();
        let running_ids = broker.snapshot(RunningComponents);
        let missing = broker
            .already_counted_components()
            .into_iter()
            .filter(|id| !running_ids.contains(id))
            .collect();

        ReadinessReport {
            expected,
            running: running_ids.len(),
            missing,
            attempts,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
