use std::task::Context;
use std::task::Poll;

use leaf_limit::SlidingLog;
use leaf_limit::Strategy;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;

use crate::RequestQueue;
use crate::queue::ResponseFuture;

/// Routes every call to the inner service through a shared [`RequestQueue`].
///
/// The queue is the buffer, so this service is always ready. Requests are cloned for
/// each attempt because a rate limited call is issued again.
#[derive(Debug)]
pub struct QueueService<S, L = SlidingLog>
where
    L: ?Sized,
{
    inner: S,
    queue: RequestQueue<L>,
}

impl<S, L> Clone for QueueService<S, L>
where
    L: ?Sized,
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<S, L> QueueService<S, L>
where
    L: ?Sized,
{
    pub fn new(inner: S, queue: RequestQueue<L>) -> Self {
        Self { inner, queue }
    }

    pub fn queue(&self) -> &RequestQueue<L> {
        &self.queue
    }
}

impl<S, L, Req> Service<Req> for QueueService<S, L>
where
    L: Strategy + ?Sized + Send + Sync + 'static,
    S: Service<Req> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<BoxError> + 'static,
    S::Future: Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let inner = self.inner.clone();
        self.queue.enqueue(move || inner.clone().oneshot(req.clone()))
    }
}
