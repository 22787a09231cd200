//! # leaf-limit
//!
//! `leaf-limit` provides the admission strategies used by the leafnode request queue
//! to keep outbound traffic inside an upstream API's quota.
//!
//! ## Key Concepts
//!
//! * **Exact Sliding Window**: [`SlidingLog`] remembers the instant of every admitted
//!   dispatch inside the trailing window, so it never admits more than its capacity in
//!   any window-length interval.
//! * **Lazy Evaluation**: Expired entries are pruned at the moment of the check,
//!   eliminating the need for background worker threads or timers.
//! * **Precise Wake-ups**: A refusal reports exactly how long until the oldest entry
//!   leaves the window, so callers can sleep once instead of polling.
//! * **Strategy Trait**: A unified interface so the queue can be driven by any budget.
//!
//! ## Example
//!
//! ```rust
//! use leaf_limit::SlidingLog;
//! use leaf_limit::Strategy;
//! use std::time::Duration;
//! use std::num::NonZeroUsize;
//!
//! let limit = NonZeroUsize::new(10).unwrap();
//! let window = Duration::from_secs(10);
//! let log = SlidingLog::new(limit, window);
//!
//! if log.process().is_continue() {
//!     // Dispatch allowed and recorded
//! }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod sliding_log;

pub use sliding_log::SlidingLog;

/// Reasons why a dispatch might be refused by a strategy.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The core trait for all admission algorithms.
///
/// Strategies must be `Send` and `Sync` to be shared with a queue's drain task
/// via `Arc`.
pub trait Strategy: Debug {
    /// Attempts to admit a single dispatch, recording it when admitted.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the budget has been exhausted.
    fn process(&self) -> ControlFlow<Reason>;

    /// Reports whether a dispatch would be admitted right now without recording one.
    fn check(&self) -> ControlFlow<Reason>;
}
