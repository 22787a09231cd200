use leaf_limit::SlidingLog;
use tower::Layer;

use crate::RequestQueue;
use crate::service::QueueService;

/// Applies a shared [`RequestQueue`] to requests.
///
/// Every service produced by one layer shares the same queue, and so the same budget
/// and the same strict one-at-a-time ordering.
#[derive(Debug)]
pub struct QueueLayer<L = SlidingLog>
where
    L: ?Sized,
{
    queue: RequestQueue<L>,
}

impl<L> Clone for QueueLayer<L>
where
    L: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<L> QueueLayer<L>
where
    L: ?Sized,
{
    /// Create a QueueLayer
    pub fn new(queue: RequestQueue<L>) -> Self {
        QueueLayer { queue }
    }
}

impl<L, S> Layer<S> for QueueLayer<L>
where
    L: ?Sized,
{
    type Service = QueueService<S, L>;

    fn layer(&self, service: S) -> Self::Service {
        QueueService::new(service, self.queue.clone())
    }
}
