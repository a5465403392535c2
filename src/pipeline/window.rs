//! Time-bounded sample window shared by the producer and the renderer.
//!
//! One mutex guards the whole deque: `push` appends and evicts inside a single
//! critical section, so a concurrent `snapshot` sees either the state before
//! the push or after eviction, never the intermediate one.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::types::Sample;

/// Ordered, time-bounded buffer of samples.
///
/// Invariants:
/// - samples are in non-decreasing `captured_at` order;
/// - after a push, every retained sample is at most `window` older than the
///   newest, except that the buffer never evicts its last sample.
#[derive(Debug)]
pub struct WindowBuffer {
    window: Duration,
    samples: Mutex<VecDeque<Sample>>,
}

impl WindowBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    pub const fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        self.samples.lock().unwrap_or_else(|e| {
            tracing::warn!("WindowBuffer mutex poisoned, recovering");
            e.into_inner()
        })
    }

    /// Append at the tail, then evict from the head everything older than the
    /// window relative to the new sample's capture time.
    ///
    /// Returns `false` (and stores nothing) if the sample is older than the
    /// current tail.
    pub fn push(&self, sample: Sample) -> bool {
        let window = self.window.as_secs_f64();
        let mut samples = self.lock();

        if let Some(tail) = samples.back() {
            if sample.captured_at < tail.captured_at {
                tracing::warn!(
                    captured_at = sample.captured_at,
                    tail = tail.captured_at,
                    "Rejecting out-of-order sample"
                );
                return false;
            }
        }

        let now = sample.captured_at;
        samples.push_back(sample);

        while samples.len() > 1 {
            match samples.front() {
                Some(head) if head.age_at(now) > window => {
                    samples.pop_front();
                }
                _ => break,
            }
        }
        true
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
