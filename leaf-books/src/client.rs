use std::sync::Arc;
use std::time::Duration;

use leaf_queue::QueueConfig;
use leaf_queue::QueueError;
use leaf_queue::RequestQueue;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::RETRY_AFTER;

use crate::Book;
use crate::BooksConfig;
use crate::BooksError;
use crate::model::VolumesResponse;

/// Bodies of failed responses are cut to this many characters in errors.
const MAX_ERROR_BODY: usize = 200;

/// Looks up book metadata through a shared [`RequestQueue`].
///
/// Every HTTP call is an enqueued operation, so all clones of a client, and every other
/// call site sharing the queue, stay inside one upstream budget.
#[derive(Debug, Clone)]
pub struct BookClient {
    http: reqwest::Client,
    config: Arc<BooksConfig>,
    queue: RequestQueue,
}

/// A queue suited to book lookups.
///
/// Every 429 is reported as a structured [`QueueError::RateLimited`], so message
/// matching is switched off: status bodies and decode positions routinely contain
/// digit runs like `429` and must not be mistaken for rate limits.
pub fn books_queue(config: QueueConfig) -> RequestQueue {
    RequestQueue::new(config.with_match_messages(false))
}

impl BookClient {
    /// Build a client on `queue`.
    ///
    /// The queue should come from [`books_queue`]. A queue with
    /// [`QueueConfig::match_messages`] enabled retries terminal errors whose text
    /// happens to mention `429`.
    pub fn new(config: BooksConfig, queue: RequestQueue) -> Result<Self, BooksError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("leafnode/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            queue,
        })
    }

    /// A client and its own queue, both configured from the environment.
    pub fn from_env() -> Result<Self, BooksError> {
        Self::new(
            BooksConfig::from_env(),
            books_queue(QueueConfig::from_env()),
        )
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Free-text volume search.
    pub async fn search(&self, query: &str) -> Result<Vec<Book>, BooksError> {
        self.volumes(sanitize_query(query)).await
    }

    pub async fn by_author(&self, author: &str) -> Result<Vec<Book>, BooksError> {
        self.volumes(qualified("inauthor", author)).await
    }

    pub async fn by_subject(&self, subject: &str) -> Result<Vec<Book>, BooksError> {
        self.volumes(qualified("subject", subject)).await
    }

    /// The first volume matching `isbn`. Hyphens and spaces are ignored.
    pub async fn by_isbn(&self, isbn: &str) -> Result<Option<Book>, BooksError> {
        let digits: String = isbn.chars().filter(char::is_ascii_alphanumeric).collect();
        if digits.is_empty() {
            return Ok(None);
        }
        let books = self.volumes(format!("isbn:{digits}")).await?;
        Ok(books.into_iter().next())
    }

    async fn volumes(&self, query: String) -> Result<Vec<Book>, BooksError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(%query, "looking up volumes");

        let http = self.http.clone();
        let config = Arc::clone(&self.config);
        let response = self
            .queue
            .enqueue(move || fetch_volumes(http.clone(), Arc::clone(&config), query.clone()))
            .await
            .map_err(BooksError::from_queue)?;

        tracing::debug!(
            total = response.total_items,
            returned = response.items.len(),
            "volumes found"
        );
        Ok(response.items.into_iter().map(Book::from).collect())
    }
}

/// Trim and collapse runs of whitespace.
pub fn sanitize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn qualified(field: &str, value: &str) -> String {
    let value = sanitize_query(value).replace('"', "");
    if value.is_empty() {
        return value;
    }
    format!("{field}:\"{value}\"")
}

async fn fetch_volumes(
    http: reqwest::Client,
    config: Arc<BooksConfig>,
    query: String,
) -> Result<VolumesResponse, BooksError> {
    let max_results = config.max_results.to_string();
    let mut request = http.get(config.volumes_url()).query(&[
        ("q", query.as_str()),
        ("maxResults", max_results.as_str()),
        ("printType", "books"),
    ]);
    if let Some(key) = &config.api_key {
        request = request.query(&[("key", key)]);
    }

    // Queries can contain digit runs like `429`; keep them out of error messages.
    let response = request.send().await.map_err(|e| e.without_url())?;
    let status = response.status();
    if let Some(error) = rate_limited(status, response.headers()) {
        return Err(error);
    }
    let body = response.bytes().await.map_err(|e| e.without_url())?;
    if !status.is_success() {
        let body = String::from_utf8_lossy(&body);
        return Err(BooksError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }
    Ok(serde_json::from_slice(&body)?)
}

/// A 429 becomes a retryable [`QueueError::RateLimited`] carrying the upstream's
/// `Retry-After`, when given in seconds.
fn rate_limited(status: StatusCode, headers: &HeaderMap) -> Option<BooksError> {
    if status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .map(Duration::from_secs);
    Some(BooksError::RateLimited(QueueError::RateLimited {
        retry_after,
    }))
}
