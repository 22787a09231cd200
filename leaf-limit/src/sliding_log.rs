use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use super::Reason;
use super::Strategy;

/// A Sliding Log implementation.
///
/// It keeps the instant of every admitted dispatch that is still inside the trailing
/// window. A dispatch is admitted iff fewer than `capacity` entries are younger than
/// `window`. Entries whose age reaches `window` are pruned on every evaluation, so the
/// log never holds more than `capacity` entries.
#[derive(Debug)]
pub struct SlidingLog {
    capacity: usize,
    window: Duration,
    /// Dispatch instants, oldest first
    log: Mutex<VecDeque<Instant>>,
    clock: Clock,
}

impl SlidingLog {
    pub fn new(capacity: NonZeroUsize, window: Duration) -> Self {
        Self::with_clock(capacity, window, Clock::new())
    }

    /// Create a log that reads time from `clock`.
    ///
    /// Mostly useful with `Clock::mock()` to drive the window deterministically.
    pub fn with_clock(capacity: NonZeroUsize, window: Duration, clock: Clock) -> Self {
        Self {
            capacity: capacity.get(),
            window,
            log: Mutex::new(VecDeque::with_capacity(capacity.get())),
            clock,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of dispatches currently inside the trailing window.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let mut log = self.lock();
        self.prune(&mut log, now);
        log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        // The log is always left consistent, so a poisoned lock is still usable
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[inline]
    fn prune(&self, log: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = log.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                log.pop_front();
            } else {
                break;
            }
        }
    }

    fn evaluate(&self, record: bool) -> ControlFlow<Reason> {
        let now = self.clock.now();
        let mut log = self.lock();
        self.prune(&mut log, now);

        if log.len() < self.capacity {
            if record {
                log.push_back(now);
            }
            return ControlFlow::Continue(());
        }

        // The log is full, so the oldest entry is the next one to leave the window.
        let retry_after = log
            .front()
            .map(|oldest| {
                self.window
                    .saturating_sub(now.saturating_duration_since(*oldest))
            })
            .unwrap_or(self.window);

        ControlFlow::Break(Reason::Overloaded { retry_after })
    }
}

impl Strategy for SlidingLog {
    #[inline]
    fn process(&self) -> ControlFlow<Reason> {
        self.evaluate(true)
    }

    #[inline]
    fn check(&self) -> ControlFlow<Reason> {
        self.evaluate(false)
    }
}
