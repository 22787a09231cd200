//! # Leaf Books
//!
//! Book metadata lookups against a Google Books compatible volumes API.
//!
//! Every HTTP call goes through a shared [`leaf_queue::RequestQueue`], so lookups from
//! anywhere in leafnode stay inside the upstream's quota. A `429 Too Many Requests`
//! answer is reported to the queue as [`leaf_queue::QueueError::RateLimited`] and
//! retried with backoff; any other failure comes back as a [`BooksError`].
//!
//! ```no_run
//! use leaf_books::BookClient;
//! use leaf_books::BooksConfig;
//! use leaf_books::books_queue;
//! use leaf_queue::QueueConfig;
//!
//! # async fn run() -> Result<(), leaf_books::BooksError> {
//! let queue = books_queue(QueueConfig::default());
//! let client = BookClient::new(BooksConfig::default(), queue)?;
//!
//! for book in client.by_author("Octavia E. Butler").await? {
//!     println!("{} ({:?})", book.title, book.published_year());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod model;

pub use client::BookClient;
pub use client::books_queue;
pub use client::sanitize_query;
pub use config::BooksConfig;
pub use config::DEFAULT_BASE_URL;
pub use error::BooksError;
pub use model::Book;
