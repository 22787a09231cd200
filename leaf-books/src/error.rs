use leaf_queue::QueueError;
use tower::BoxError;

/// Errors from a book lookup.
#[derive(Debug, thiserror::Error)]
pub enum BooksError {
    /// The upstream kept answering 429 until the queue ran out of retries.
    #[error("book API rate limit not lifted after retries")]
    RateLimited(#[source] QueueError),

    #[error("book API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("book API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("book API response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    /// The queue settled the request without running it to completion.
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("book lookup failed: {0}")]
    Other(BoxError),
}

impl BooksError {
    /// Recover the typed error from what the queue hands back.
    pub(crate) fn from_queue(error: BoxError) -> Self {
        let error = match error.downcast::<BooksError>() {
            Ok(books) => return *books,
            Err(error) => error,
        };
        match error.downcast::<QueueError>() {
            Ok(queue) => Self::Queue(*queue),
            Err(error) => Self::Other(error),
        }
    }
}
