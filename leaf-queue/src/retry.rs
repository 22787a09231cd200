//! Classification of failed attempts.

use std::error::Error;
use std::time::Duration;

use tower::BoxError;

use crate::QueueError;

/// Message fragments that mark a loosely typed error as an upstream rate limit.
const RATE_LIMIT_MARKERS: [&str; 2] = ["429", "rate limit"];

fn chain(error: &BoxError) -> impl Iterator<Item = &(dyn Error + 'static)> {
    let root: &(dyn Error + 'static) = &**error;
    std::iter::successors(Some(root), |e| (*e).source())
}

/// Decide whether a failed attempt should be retried.
///
/// A [`QueueError::RateLimited`] anywhere in the error's source chain is always
/// retryable. When `match_messages` is set, an error whose message mentions `429` or
/// `rate limit` (case-insensitive) is treated the same way, for upstream clients that
/// only report the status in text.
pub fn is_rate_limited(error: &BoxError, match_messages: bool) -> bool {
    chain(error).any(|e| {
        if matches!(
            e.downcast_ref::<QueueError>(),
            Some(QueueError::RateLimited { .. })
        ) {
            return true;
        }
        if !match_messages {
            return false;
        }
        let message = e.to_string().to_lowercase();
        RATE_LIMIT_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    })
}

/// The upstream's own `Retry-After` hint, if the error carries one.
pub(crate) fn retry_hint(error: &BoxError) -> Option<Duration> {
    chain(error).find_map(|e| match e.downcast_ref::<QueueError>() {
        Some(QueueError::RateLimited { retry_after }) => *retry_after,
        _ => None,
    })
}
