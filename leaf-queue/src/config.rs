//! Configuration for the request queue.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

/// Where a retried request goes back into the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryPlacement {
    /// Ahead of everything still waiting, so retries are serviced before fresh work.
    #[default]
    Front,
    /// Behind everything still waiting.
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown retry placement `{0}`, expected `front` or `back`")]
pub struct ParsePlacementError(String);

impl FromStr for RetryPlacement {
    type Err = ParsePlacementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            _ => Err(ParsePlacementError(s.to_string())),
        }
    }
}

/// Configuration for a [`RequestQueue`](crate::RequestQueue).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Dispatches admitted per `time_window`
    pub max_requests: NonZeroUsize,

    /// Length of the trailing window the budget applies to
    pub time_window: Duration,

    /// Retries allowed per request after its first attempt
    pub max_retries: u32,

    /// Delay before the first retry; doubles for every retry after that
    pub base_delay: Duration,

    /// Where retried requests are reinserted
    pub retry_placement: RetryPlacement,

    /// Upper bound of the random delay added on top of the backoff. Zero disables it.
    pub max_jitter: Duration,

    /// Also treat errors whose message mentions `429` or `rate limit` as retryable
    pub match_messages: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_requests: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
            time_window: Duration::from_secs(10),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            retry_placement: RetryPlacement::Front,
            max_jitter: Duration::ZERO,
            match_messages: true,
        }
    }
}

impl QueueConfig {
    pub fn with_max_requests(mut self, max_requests: NonZeroUsize) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn with_time_window(mut self, time_window: Duration) -> Self {
        self.time_window = time_window;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_retry_placement(mut self, retry_placement: RetryPlacement) -> Self {
        self.retry_placement = retry_placement;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    pub fn with_match_messages(mut self, match_messages: bool) -> Self {
        self.match_messages = match_messages;
        self
    }

    /// Create config from `LEAFNODE_QUEUE_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup, starting from the defaults.
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(n) = parse(&lookup, "LEAFNODE_QUEUE_MAX_REQUESTS") {
            config.max_requests = n;
        }
        if let Some(ms) = parse(&lookup, "LEAFNODE_QUEUE_WINDOW_MS") {
            config.time_window = Duration::from_millis(ms);
        }
        if let Some(n) = parse(&lookup, "LEAFNODE_QUEUE_MAX_RETRIES") {
            config.max_retries = n;
        }
        if let Some(ms) = parse(&lookup, "LEAFNODE_QUEUE_BASE_DELAY_MS") {
            config.base_delay = Duration::from_millis(ms);
        }
        if let Some(placement) = parse(&lookup, "LEAFNODE_QUEUE_RETRY_PLACEMENT") {
            config.retry_placement = placement;
        }
        if let Some(ms) = parse(&lookup, "LEAFNODE_QUEUE_MAX_JITTER_MS") {
            config.max_jitter = Duration::from_millis(ms);
        }
        if let Some(enabled) = parse(&lookup, "LEAFNODE_QUEUE_MATCH_MESSAGES") {
            config.match_messages = enabled;
        }

        config
    }

    /// Exponential backoff before retry `retry` (0-indexed): `base_delay * 2^retry`,
    /// or `Duration::MAX` once that overflows.
    pub fn backoff(&self, retry: u32) -> Duration {
        2u32.checked_pow(retry)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// The full wait before retry `retry`: backoff plus jitter, never less than the
    /// upstream's own hint.
    pub fn retry_delay(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let mut delay = self.backoff(retry);
        if !self.max_jitter.is_zero() {
            let bound = u64::try_from(self.max_jitter.as_nanos()).unwrap_or(u64::MAX);
            let jitter = rand::rng().random_range(0..bound);
            delay = delay.saturating_add(Duration::from_nanos(jitter));
        }
        match hint {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid queue setting");
            None
        }
    }
}
