use std::future::Future;

use futures::FutureExt;
use futures::TryFutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tower::BoxError;

/// A failed attempt. The job comes back so the queue can retry or reject it.
pub(crate) struct Failed {
    pub(crate) job: Box<dyn Job>,
    pub(crate) error: BoxError,
}

/// A type-erased unit of work waiting in the queue.
///
/// Erasing the result type lets requests producing different `T`s share one queue and
/// one budget.
pub(crate) trait Job: Send {
    /// Run the operation once. Success settles the caller directly.
    fn attempt(self: Box<Self>) -> BoxFuture<'static, Result<(), Failed>>;

    /// Settle the caller with a terminal error.
    fn reject(self: Box<Self>, error: BoxError);
}

type MakeAttempt<T> = Box<dyn FnMut() -> BoxFuture<'static, Result<T, BoxError>> + Send>;

pub(crate) struct Operation<T> {
    make: MakeAttempt<T>,
    respond: oneshot::Sender<Result<T, BoxError>>,
}

impl<T> Operation<T> {
    pub(crate) fn new<F, Fut, E>(
        mut operation: F,
        respond: oneshot::Sender<Result<T, BoxError>>,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
        T: 'static,
    {
        Self {
            make: Box::new(move || operation().map_err(Into::<BoxError>::into).boxed()),
            respond,
        }
    }
}

impl<T: Send + 'static> Job for Operation<T> {
    fn attempt(mut self: Box<Self>) -> BoxFuture<'static, Result<(), Failed>> {
        Box::pin(async move {
            // Built on first poll so a panicking constructor unwinds inside the drain loop's
            // catch_unwind.
            let attempt = (self.make)();
            match attempt.await {
                Ok(value) => {
                    let Operation { respond, .. } = *self;
                    // The caller may have stopped waiting; that is not our failure.
                    let _ = respond.send(Ok(value));
                    Ok(())
                }
                Err(error) => Err(Failed { job: self, error }),
            }
        })
    }

    fn reject(self: Box<Self>, error: BoxError) {
        let Operation { respond, .. } = *self;
        let _ = respond.send(Err(error));
    }
}
