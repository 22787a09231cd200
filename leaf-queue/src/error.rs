use std::time::Duration;

/// Errors produced by the request queue itself.
///
/// Errors returned by queued operations are handed back to the caller untouched; only
/// these variants are ever synthesized by the queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The upstream API refused the request because its quota was exhausted.
    ///
    /// Operations return this to signal a retryable failure. When the upstream sent a
    /// `Retry-After` hint it is carried here and the backoff never undercuts it.
    #[error("Upstream rate limit exceeded{}", retry_hint(.retry_after))]
    RateLimited {
        /// How long the upstream asked us to wait, if it said.
        retry_after: Option<Duration>,
    },

    /// The request was still waiting in the queue when the queue was cleared.
    #[error("Request queue cleared before the request was dispatched")]
    Cleared,

    /// The request was dropped without being settled, typically because the runtime
    /// driving the queue shut down.
    #[error("Request queue closed before the request settled")]
    Closed,

    /// `enqueue` was called outside of a Tokio runtime, so nothing could drain the queue.
    #[error("No Tokio runtime is available to drain the request queue")]
    NoRuntime,
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!("; retry after {wait:?}"),
        None => String::new(),
    }
}
