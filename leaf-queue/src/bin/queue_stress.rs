use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use hdrhistogram::Histogram;
use leaf_queue::QueueConfig;
use leaf_queue::QueueError;
use leaf_queue::RequestQueue;
use leaf_queue::RetryPlacement;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tower::BoxError;

/// Simulates a book-metadata API that rate limits every `reject_every`-th call.
async fn mock_books_call(
    calls: Arc<AtomicUsize>,
    reject_every: usize,
) -> Result<&'static str, BoxError> {
    sleep(Duration::from_millis(2)).await;
    let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call % reject_every == 0 {
        return Err(Box::new(QueueError::RateLimited { retry_after: None }));
    }
    Ok("volume")
}

#[derive(Default)]
struct RejectionCounter {
    rate_limited: usize,
    cleared: usize,
    closed: usize,
    unknown: usize,
}

async fn run_load_test(name: &str, queue: RequestQueue, total_reqs: usize, reject_every: usize) {
    let mut hist_elapsed = Histogram::<u64>::new_with_bounds(1, 600_000_000, 3).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let mut tasks = JoinSet::new();
    let mut rejections = RejectionCounter::default();

    let start = Instant::now();

    for _ in 0..total_reqs {
        let calls = calls.clone();
        let req_start = Instant::now();
        let fut = queue.enqueue(move || mock_books_call(calls.clone(), reject_every));
        tasks.spawn(async move { (fut.await, req_start.elapsed()) });
    }

    let mut success_count = 0;

    while let Some(task) = tasks.join_next().await {
        let (res, elapsed) = task.expect("Task panicked");
        match res {
            Ok(_) => {
                success_count += 1;
                hist_elapsed.record(elapsed.as_micros() as u64).unwrap();
            }
            Err(e) => match e.downcast_ref::<QueueError>() {
                Some(QueueError::RateLimited { .. }) => rejections.rate_limited += 1,
                Some(QueueError::Cleared) => rejections.cleared += 1,
                Some(QueueError::Closed) | Some(QueueError::NoRuntime) => rejections.closed += 1,
                None => rejections.unknown += 1,
            },
        }
    }

    let total_duration = start.elapsed();
    let goodput = success_count as f64 / total_duration.as_secs_f64();

    println!("--- {} ---", name);
    println!("Total Duration:  {:.2?}", total_duration);
    println!("Success/Total:   {}/{}", success_count, total_reqs);
    println!("Upstream Calls:  {}", calls.load(Ordering::SeqCst));
    println!("Success Rate:    {:.2} req/sec (Goodput)", goodput);

    if success_count > 0 {
        println!("P50 (Elapsed):   {}µs", hist_elapsed.value_at_quantile(0.5));
        println!(
            "P99 (Elapsed):   {}µs",
            hist_elapsed.value_at_quantile(0.99)
        );
    }

    let total_errors =
        rejections.rate_limited + rejections.cleared + rejections.closed + rejections.unknown;
    println!("Errors:          {}", total_errors);
    if total_errors > 0 {
        println!("  └─ RateLimited: {}", rejections.rate_limited);
        if rejections.cleared > 0 {
            println!("  └─ Cleared:     {}", rejections.cleared);
        }
        if rejections.closed > 0 {
            println!("  └─ Closed:      {}", rejections.closed);
        }
        if rejections.unknown > 0 {
            println!("  └─ Unknown:     {}", rejections.unknown);
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let max_requests = NonZeroUsize::new(100).ok_or("budget must be non-zero")?;
    let total_reqs = 500;
    let reject_every = 7;

    let base = QueueConfig::default()
        .with_max_requests(max_requests)
        .with_time_window(Duration::from_secs(1))
        .with_base_delay(Duration::from_millis(20));

    // 1. Retries jump the queue
    let queue = RequestQueue::new(base.clone().with_retry_placement(RetryPlacement::Front));
    run_load_test("Sliding Log, Retry Front", queue, total_reqs, reject_every).await;

    // 2. Retries wait their turn
    let queue = RequestQueue::new(base.clone().with_retry_placement(RetryPlacement::Back));
    run_load_test("Sliding Log, Retry Back", queue, total_reqs, reject_every).await;

    // 3. Jittered backoff
    let queue = RequestQueue::new(base.with_max_jitter(Duration::from_millis(20)));
    run_load_test("Sliding Log, Jittered", queue, total_reqs, reject_every).await;

    Ok(())
}
