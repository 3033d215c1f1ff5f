//! Lock-protected storage primitives owned by the [`Broker`](super::Broker).
//!
//! * [`Channel`] is an unbounded FIFO guarded by its own mutex.  Dequeue on an
//!   empty channel returns `None` immediately; [`Channel::pop_timeout`] is the
//!   bounded-wait variant backed by a condition variable.
//! * [`Variable`] is a single last-write-wins slot.
//!
//! Each instance has exactly one lock, held only for the duration of a single
//! operation.  Operations on different instances never contend.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Unbounded, thread-safe FIFO queue.
///
/// ```rust
/// use voice_robot::broker::Channel;
///
/// let channel = Channel::new();
/// channel.push("a");
/// channel.push("b");
/// assert_eq!(channel.pop(), Some("a"));
/// assert_eq!(channel.pop(), Some("b"));
/// assert_eq!(channel.pop(), None);
/// ```
#[derive(Debug)]
pub struct Channel<T> {
    queue: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Channel<T> {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    /// Append `message` at the tail and wake one waiter.
    pub fn push(&self, message: T) {
        self.lock().push_back(message);
        self.ready.notify_one();
    }

    /// Pop the head, or `None` when the channel is empty.  Never blocks on
    /// an empty queue.
    pub fn pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Pop the head, waiting at most `timeout` for a message to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock();
        loop {
            if let Some(message) = queue.pop_front() {
                return Some(message);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            queue = self
                .ready
                .wait_timeout(queue, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Lock the queue.  A panic in another thread while holding the lock
    /// leaves the `VecDeque` structurally valid, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: PartialEq> Channel<T> {
    /// Remove the first message equal to `message`.  Returns whether one was
    /// found; the channel is untouched otherwise.
    pub fn remove(&self, message: &T) -> bool {
        let mut queue = self.lock();
        match queue.iter().position(|queued| queued == message) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Membership test under value equality.
    pub fn contains(&self, message: &T) -> bool {
        self.lock().contains(message)
    }

    /// Append `message` unless an equal one is already queued.
    pub(crate) fn push_unique(&self, message: T) -> bool {
        let mut queue = self.lock();
        if queue.contains(&message) {
            return false;
        }
        queue.push_back(message);
        drop(queue);
        self.ready.notify_one();
        true
    }
}

impl<T: Clone> Channel<T> {
    /// Ordered copy of the current contents, head first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Variable
// ---------------------------------------------------------------------------

/// Single-slot cell where the most recent write wins.
#[derive(Debug)]
pub struct Variable<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Variable<T> {
    /// Create an unset variable.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Replace the stored value.
    pub fn set(&self, value: T) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

impl<T> Default for Variable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Variable<T> {
    /// Copy of the last completed write, or `None` if never set.
    pub fn get(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
