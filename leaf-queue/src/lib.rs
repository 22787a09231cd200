//! # Leaf Queue
//!
//! `leaf-queue` keeps outbound calls to a quota-constrained upstream API inside its
//! budget.
//!
//! ## The Request Queue
//! A [`RequestQueue`] runs queued operations strictly one at a time, in order, through a
//! single drain loop:
//!
//! 1. **Budgeting**: A request is only dispatched when the [`leaf_limit::Strategy`]
//!    admits it. By default this is a [`leaf_limit::SlidingLog`] allowing
//!    `max_requests` dispatches in any trailing `time_window`. When the budget is
//!    spent, the loop sleeps exactly until the oldest dispatch leaves the window.
//! 2. **Retries**: An operation failing with [`QueueError::RateLimited`] (or, optionally,
//!    an error whose message mentions `429`) is retried after `base_delay * 2^k`, up to
//!    `max_retries` times. The retry goes back to the front of the queue by default.
//! 3. **Cancellation**: [`RequestQueue::clear_queue`] fails everything still waiting with
//!    [`QueueError::Cleared`], leaving the in-flight request alone.
//!
//! Every enqueued future settles. Errors from operations are returned untouched.
//!
//! ## Tower
//! [`QueueLayer`] routes a [`tower::Service`] through a shared queue.

mod config;
mod error;
mod job;
mod layer;
mod queue;
mod retry;
mod service;


pub use config::ParsePlacementError;
pub use config::QueueConfig;
pub use config::RetryPlacement;
pub use error::QueueError;
pub use layer::QueueLayer;
pub use queue::RequestQueue;
pub use queue::ResponseFuture;
pub use retry::is_rate_limited;
pub use service::QueueService;
