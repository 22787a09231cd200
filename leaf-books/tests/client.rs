//! Lookups against a local stand-in for the volumes API.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use leaf_books::BookClient;
use leaf_books::BooksConfig;
use leaf_books::BooksError;
use leaf_books::books_queue;
use leaf_queue::QueueConfig;
use leaf_queue::QueueError;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

const FOUNDATION: &str = r#"{
    "kind": "books#volumes",
    "totalItems": 1,
    "items": [{
        "id": "found-1",
        "volumeInfo": {
            "title": "Foundation",
            "authors": ["Isaac Asimov"],
            "publishedDate": "1951",
            "industryIdentifiers": [{"type": "ISBN_13", "identifier": "9780553293357"}]
        }
    }]
}"#;

fn respond(status: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
        body.len()
    )
}

fn ok(body: &str) -> String {
    respond("200 OK", "", body)
}

fn too_many_requests() -> String {
    respond(
        "429 Too Many Requests",
        "Retry-After: 0\r\n",
        r#"{"error": {"code": 429}}"#,
    )
}

/// Serve `responses` in order, one per connection, recording each request line.
async fn upstream(responses: Vec<String>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);

    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let request = String::from_utf8_lossy(&buf);
            let line = request.lines().next().unwrap_or_default().to_string();
            seen.lock().unwrap().push(line);

            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}"), requests)
}

fn client(base_url: &str, queue: QueueConfig) -> BookClient {
    let config = BooksConfig::default()
        .with_base_url(base_url)
        .with_timeout(Duration::from_secs(5));
    BookClient::new(config, books_queue(queue)).unwrap()
}

fn fast_retries() -> QueueConfig {
    QueueConfig::default().with_base_delay(Duration::from_millis(10))
}

#[tokio::test]
async fn it_finds_books() {
    let (url, requests) = upstream(vec![ok(FOUNDATION)]).await;
    let client = client(&url, fast_retries());

    let books = client.search("  foundation   asimov ").await.unwrap();

    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Foundation");
    assert_eq!(books[0].authors, ["Isaac Asimov"]);
    assert_eq!(books[0].published_year(), Some(1951));

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("GET /volumes?"), "{}", requests[0]);
    assert!(requests[0].contains("q=foundation+asimov"), "{}", requests[0]);
    assert!(requests[0].contains("maxResults=20"), "{}", requests[0]);
}

#[tokio::test]
async fn author_lookups_use_inauthor() {
    let (url, requests) = upstream(vec![ok(FOUNDATION)]).await;
    let client = client(&url, fast_retries());

    client.by_author("Isaac Asimov").await.unwrap();

    let requests = requests.lock().unwrap();
    assert!(requests[0].contains("q=inauthor%3A%22Isaac+Asimov%22"), "{}", requests[0]);
}

#[tokio::test]
async fn isbn_lookup_returns_the_first_hit() {
    let (url, requests) = upstream(vec![ok(FOUNDATION)]).await;
    let client = client(&url, fast_retries());

    let book = client.by_isbn("978-0-553-29335-7").await.unwrap().unwrap();
    assert_eq!(book.isbn_13.as_deref(), Some("9780553293357"));

    let requests = requests.lock().unwrap();
    assert!(requests[0].contains("q=isbn%3A9780553293357"), "{}", requests[0]);
}

#[tokio::test]
async fn isbn_lookup_with_no_hits_is_none() {
    let (url, _) = upstream(vec![ok(r#"{"kind": "books#volumes", "totalItems": 0}"#)]).await;
    let client = client(&url, fast_retries());

    assert_eq!(client.by_isbn("0000000000").await.unwrap(), None);
}

#[tokio::test]
async fn rate_limited_lookups_are_retried() {
    let (url, requests) = upstream(vec![too_many_requests(), ok(FOUNDATION)]).await;
    let client = client(&url, fast_retries());

    let books = client.by_subject("science fiction").await.unwrap();

    assert_eq!(books.len(), 1);
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn exhausted_retries_surface_the_rate_limit() {
    let (url, requests) = upstream(vec![too_many_requests(), too_many_requests()]).await;
    let client = client(&url, fast_retries().with_max_retries(1));

    let err = client.search("dune").await.unwrap_err();

    assert!(
        matches!(
            err,
            BooksError::RateLimited(QueueError::RateLimited { .. })
        ),
        "{err:?}"
    );
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn server_errors_are_not_retried() {
    let (url, requests) = upstream(vec![respond(
        "503 Service Unavailable",
        "",
        "backend unavailable",
    )])
    .await;
    let client = client(&url, fast_retries());

    let err = client.search("dune").await.unwrap_err();

    match err {
        BooksError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "backend unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_bodies_are_decode_errors() {
    let (url, _) = upstream(vec![ok("{\"items\": [")]).await;
    let client = client(&url, fast_retries());

    let err = client.search("dune").await.unwrap_err();
    assert!(matches!(err, BooksError::Decode(_)), "{err:?}");
}

#[tokio::test]
async fn blank_queries_never_reach_the_upstream() {
    // Nothing listens here; any request would fail.
    let client = client("http://127.0.0.1:9", fast_retries());

    assert!(client.search(" \t ").await.unwrap().is_empty());
    assert!(client.by_author("").await.unwrap().is_empty());
    assert_eq!(client.by_isbn("--").await.unwrap(), None);
    assert_eq!(client.queue().queue_size(), 0);
}

#[tokio::test]
async fn error_bodies_mentioning_429_are_not_retried() {
    let (url, requests) = upstream(vec![respond(
        "500 Internal Server Error",
        "",
        "order 4291 failed",
    )])
    .await;
    let client = client(&url, fast_retries());

    let err = client.search("dune").await.unwrap_err();

    assert!(
        matches!(&err, BooksError::Status { status: 500, body } if body == "order 4291 failed"),
        "{err:?}"
    );
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn decode_errors_on_line_429_are_not_retried() {
    // Leaves the decoder failing on line 429 of the body
    let body = format!("{{\"items\": [{}}}", "\n".repeat(428));
    let (url, requests) = upstream(vec![ok(&body)]).await;
    let client = client(&url, fast_retries());

    let err = client.search("dune").await.unwrap_err();

    assert!(matches!(&err, BooksError::Decode(_)), "{err:?}");
    assert!(err.to_string().contains("line 429"), "{err}");
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[test]
fn books_queues_never_match_messages() {
    let queue = books_queue(QueueConfig::default().with_match_messages(true));
    assert!(!queue.config().match_messages);
}
