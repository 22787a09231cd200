use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::task::Context;
use std::task::Poll;
use std::task::ready;

use futures::FutureExt;
use leaf_limit::Reason;
use leaf_limit::SlidingLog;
use leaf_limit::Strategy;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use pin_project_lite::pin_project;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio::time::sleep;
use tower::BoxError;

use crate::QueueConfig;
use crate::QueueError;
use crate::RetryPlacement;
use crate::job::Failed;
use crate::job::Job;
use crate::job::Operation;
use crate::retry::is_rate_limited;
use crate::retry::retry_hint;

#[derive(Clone, Debug)]
struct QueueMetrics {
    enqueued: Counter<u64>,
    dispatched: Counter<u64>,
    retried: Counter<u64>,
    rejected: Counter<u64>,
    cleared: Counter<u64>,
    budget_waits: Counter<u64>,
}

impl QueueMetrics {
    fn new() -> Self {
        let meter = global::meter("request_queue");
        Self {
            enqueued: meter.u64_counter("queue_enqueued").build(),
            dispatched: meter.u64_counter("queue_dispatched").build(),
            retried: meter.u64_counter("queue_retried").build(),
            rejected: meter.u64_counter("queue_rejected").build(),
            cleared: meter.u64_counter("queue_cleared").build(),
            budget_waits: meter.u64_counter("queue_budget_waits").build(),
        }
    }
}

/// A request waiting for its turn.
struct Record {
    id: u64,
    job: Box<dyn Job>,
    retries: u32,
    enqueued_at: Instant,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Record>,
    /// Set while a drain loop owns the queue. Only flipped under the state lock.
    draining: bool,
    next_id: u64,
}

struct Shared<L>
where
    L: ?Sized,
{
    config: QueueConfig,
    limiter: Arc<L>,
    state: Mutex<State>,
    metrics: QueueMetrics,
}

impl<L: ?Sized> Shared<L> {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State is never left half-updated, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A serialized, rate limited queue of outbound requests.
///
/// Every request is run by a single drain loop, one at a time, in enqueue order. A
/// request is only dispatched when the [`Strategy`] admits it, and a request that fails
/// because the upstream rate limited it is retried with exponential backoff up to
/// [`QueueConfig::max_retries`] times.
///
/// The queue is a cheap handle over shared state: create it once and clone it into every
/// call site that talks to the same upstream, so they all share one budget.
pub struct RequestQueue<L = SlidingLog>
where
    L: ?Sized,
{
    shared: Arc<Shared<L>>,
}

impl<L> Clone for RequestQueue<L>
where
    L: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<L> fmt::Debug for RequestQueue<L>
where
    L: ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("RequestQueue")
            .field("config", &self.shared.config)
            .field("queue_size", &state.queue.len())
            .field("draining", &state.draining)
            .finish()
    }
}

impl RequestQueue<SlidingLog> {
    /// Create a queue whose budget is a [`SlidingLog`] built from `config`.
    pub fn new(config: QueueConfig) -> Self {
        let limiter = Arc::new(SlidingLog::new(config.max_requests, config.time_window));
        Self::with_strategy(config, limiter)
    }
}

impl<L> RequestQueue<L>
where
    L: Strategy + ?Sized + Send + Sync + 'static,
{
    /// Create a queue admitting dispatches through `limiter`.
    ///
    /// `config.max_requests` and `config.time_window` are not consulted; the strategy
    /// owns the budget.
    pub fn with_strategy(config: QueueConfig, limiter: Arc<L>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                limiter,
                state: Mutex::new(State::default()),
                metrics: QueueMetrics::new(),
            }),
        }
    }

    /// Queue `operation` and return a future for its result.
    ///
    /// The operation may be called more than once: every retry calls it again. The
    /// returned future resolves with the first successful value, or fails with the last
    /// error once the request is terminal. Errors from the operation are passed through
    /// untouched.
    ///
    /// This never fails synchronously. If no drain loop is running one is spawned on the
    /// current Tokio runtime; without a runtime the future fails with
    /// [`QueueError::NoRuntime`].
    pub fn enqueue<F, Fut, T, E>(&self, operation: F) -> ResponseFuture<T>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Box<dyn Job> = Box::new(Operation::new(operation, tx));

        let start_drain = {
            let mut state = self.shared.lock();
            let id = state.next_id;
            state.next_id += 1;
            state.queue.push_back(Record {
                id,
                job,
                retries: 0,
                enqueued_at: Instant::now(),
            });
            tracing::debug!(id, queue_size = state.queue.len(), "request enqueued");
            !std::mem::replace(&mut state.draining, true)
        };
        self.shared.metrics.enqueued.add(1, &[]);

        if start_drain {
            // Owned by the drain task from here on, so a task dropped before its first
            // poll still releases the queue.
            let guard = DrainGuard::new(Arc::clone(&self.shared));
            match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(drain(guard));
                }
                Err(_) => {
                    // Nothing can ever run these, so settle them all now.
                    let stranded = guard.release();
                    tracing::warn!(
                        stranded = stranded.len(),
                        "request enqueued outside a Tokio runtime"
                    );
                    for record in stranded {
                        record.job.reject(Box::new(QueueError::NoRuntime));
                    }
                }
            }
        }

        ResponseFuture { inner: rx }
    }

    /// True iff the budget would admit a dispatch right now.
    pub fn can_make_request(&self) -> bool {
        self.shared.limiter.check().is_continue()
    }

    /// Cancel every request still waiting in the queue.
    ///
    /// Each one fails with [`QueueError::Cleared`]. The request currently in flight, or
    /// sleeping through its backoff, is not affected. Returns the number cancelled.
    pub fn clear_queue(&self) -> usize {
        let cancelled: Vec<Record> = self.shared.lock().queue.drain(..).collect();
        let count = cancelled.len();
        for record in cancelled {
            record.job.reject(Box::new(QueueError::Cleared));
        }
        if count > 0 {
            self.shared.metrics.cleared.add(count as u64, &[]);
        }
        tracing::info!(cancelled = count, "request queue cleared");
        count
    }

    /// Requests not yet dispatched.
    pub fn queue_size(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Whether a drain loop currently owns the queue.
    pub fn is_draining(&self) -> bool {
        self.shared.lock().draining
    }

    pub fn config(&self) -> &QueueConfig {
        &self.shared.config
    }
}

/// Ownership of the draining flag.
///
/// If the drain task is torn down without reaching an empty queue (runtime shutdown, or
/// a spawn that was never polled), dropping the guard clears the flag and settles every
/// stranded request with [`QueueError::Closed`], so a later `enqueue` starts afresh.
struct DrainGuard<L: ?Sized> {
    shared: Arc<Shared<L>>,
    armed: bool,
}

impl<L: ?Sized> DrainGuard<L> {
    fn new(shared: Arc<Shared<L>>) -> Self {
        Self {
            shared,
            armed: true,
        }
    }

    /// Clear the flag and take whatever is still queued.
    fn release(mut self) -> Vec<Record> {
        self.armed = false;
        let mut state = self.shared.lock();
        state.draining = false;
        state.queue.drain(..).collect()
    }
}

impl<L: ?Sized> Drop for DrainGuard<L> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let stranded: Vec<Record> = {
            let mut state = self.shared.lock();
            state.draining = false;
            state.queue.drain(..).collect()
        };
        if !stranded.is_empty() {
            tracing::warn!(stranded = stranded.len(), "drain loop torn down");
        }
        for record in stranded {
            record.job.reject(Box::new(QueueError::Closed));
        }
    }
}

async fn drain<L>(mut guard: DrainGuard<L>)
where
    L: Strategy + ?Sized + Send + Sync + 'static,
{
    let shared = Arc::clone(&guard.shared);
    tracing::debug!("drain loop started");

    loop {
        let step = {
            let mut state = shared.lock();
            let Some(record) = state.queue.pop_front() else {
                state.draining = false;
                guard.armed = false;
                break;
            };
            // Admission and removal happen under one lock so a clear can't slip between.
            match shared.limiter.process() {
                ControlFlow::Continue(()) => Ok(record),
                ControlFlow::Break(Reason::Overloaded { retry_after }) => {
                    state.queue.push_front(record);
                    Err(retry_after)
                }
            }
        };

        match step {
            Ok(record) => dispatch(&shared, record).await,
            Err(retry_after) => {
                shared.metrics.budget_waits.add(1, &[]);
                tracing::debug!(
                    wait_ms = retry_after.as_millis() as u64,
                    "budget exhausted; waiting for the window to slide"
                );
                sleep(retry_after).await;
            }
        }
    }

    drop(guard);
    tracing::debug!("drain loop idle");
}

async fn dispatch<L>(shared: &Shared<L>, record: Record)
where
    L: ?Sized,
{
    let Record {
        id,
        job,
        retries,
        enqueued_at,
    } = record;
    let config = &shared.config;

    shared.metrics.dispatched.add(1, &[]);
    tracing::debug!(
        id,
        attempt = retries + 1,
        waited_ms = enqueued_at.elapsed().as_millis() as u64,
        "dispatching request"
    );

    let Failed { job, error } = match AssertUnwindSafe(job.attempt()).catch_unwind().await {
        Ok(Ok(())) => {
            tracing::debug!(id, attempts = retries + 1, "request succeeded");
            return;
        }
        Ok(Err(failed)) => failed,
        Err(_) => {
            // The job was dropped while unwinding, so its caller sees `Closed`.
            shared.metrics.rejected.add(1, &[]);
            tracing::error!(id, "queued operation panicked");
            return;
        }
    };

    if retries < config.max_retries && is_rate_limited(&error, config.match_messages) {
        let delay = config.retry_delay(retries, retry_hint(&error));
        shared.metrics.retried.add(1, &[]);
        tracing::warn!(
            id,
            retry = retries + 1,
            max_retries = config.max_retries,
            delay_ms = delay.as_millis() as u64,
            %error,
            "upstream rate limited request; backing off"
        );
        sleep(delay).await;

        let record = Record {
            id,
            job,
            retries: retries + 1,
            enqueued_at,
        };
        let mut state = shared.lock();
        match config.retry_placement {
            RetryPlacement::Front => state.queue.push_front(record),
            RetryPlacement::Back => state.queue.push_back(record),
        }
    } else {
        shared.metrics.rejected.add(1, &[]);
        tracing::debug!(id, attempts = retries + 1, %error, "request failed");
        job.reject(error);
    }
}

pin_project! {
    /// The eventual result of an enqueued request.
    pub struct ResponseFuture<T> {
        #[pin]
        inner: oneshot::Receiver<Result<T, BoxError>>,
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.inner.poll(cx)) {
            Ok(res) => Poll::Ready(res),
            Err(_) => Poll::Ready(Err(Box::new(QueueError::Closed))),
        }
    }
}
