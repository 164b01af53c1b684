//! Load generator for the router.
//!
//! Fires a fixed number of requests with bounded concurrency, then prints how
//! the responses were spread over backends and the latency percentiles.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use futures_util::future::join_all;

#[derive(Debug, Parser)]
#[command(name = "loadgen", about = "Send requests through the router and summarize the results")]
struct Args {
    #[arg(short, long, default_value = "http://127.0.0.1:8000/")]
    url: String,

    /// Total number of requests.
    #[arg(short = 'n', long, default_value_t = 1000)]
    requests: usize,

    /// Requests in flight at once.
    #[arg(short, long, default_value_t = 20)]
    concurrency: usize,

    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
}

#[derive(Default)]
struct Summary {
    latencies: Vec<Duration>,
    by_backend: BTreeMap<String, usize>,
    failures: usize,
}

impl Summary {
    fn merge(&mut self, other: Summary) {
        self.latencies.extend(other.latencies);
        for (backend, count) in other.by_backend {
            *self.by_backend.entry(backend).or_default() += count;
        }
        self.failures += other.failures;
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = (pct * sorted.len()).div_ceil(100).saturating_sub(1);
    sorted[idx]
}

/// `Hello from backend1 | req=3 | latency=12µs` → `Hello from backend1`.
fn backend_label(body: &str) -> String {
    body.split(" | ").next().unwrap_or_default().trim().to_string()
}

async fn worker(client: reqwest::Client, url: Arc<str>, remaining: Arc<AtomicUsize>) -> Summary {
    let mut summary = Summary::default();
    while remaining
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        .is_ok()
    {
        let start = Instant::now();
        let outcome = match client.get(&*url).send().await {
            Ok(res) if res.status().is_success() => res.text().await.ok(),
            _ => None,
        };
        match outcome {
            Some(body) => {
                summary.latencies.push(start.elapsed());
                *summary.by_backend.entry(backend_label(&body)).or_default() += 1;
            }
            None => summary.failures += 1,
        }
    }
    summary
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_millis(args.timeout_ms))
        .build()?;

    let url: Arc<str> = args.url.as_str().into();
    let remaining = Arc::new(AtomicUsize::new(args.requests));
    let start = Instant::now();

    let workers = (0..args.concurrency.max(1))
        .map(|_| tokio::spawn(worker(client.clone(), url.clone(), remaining.clone())));
    let mut summary = Summary::default();
    for joined in join_all(workers).await {
        summary.merge(joined?);
    }
    let elapsed = start.elapsed();

    summary.latencies.sort_unstable();
    let ok = summary.latencies.len();

    println!("\n--- Load Results ---");
    println!("Requests:     {}", args.requests);
    println!("Concurrency:  {}", args.concurrency);
    println!("Duration:     {:?}", elapsed);
    println!("Requests/sec: {:.2}", args.requests as f64 / elapsed.as_secs_f64());
    println!("Success:      {}/{}", ok, args.requests);
    println!("P50 latency:  {:?}", percentile(&summary.latencies, 50));
    println!("P95 latency:  {:?}", percentile(&summary.latencies, 95));
    println!("P99 latency:  {:?}", percentile(&summary.latencies, 99));
    println!("--- Per backend ---");
    for (backend, count) in &summary.by_backend {
        println!("{:<24} {:>6} ({:.1}%)", backend, count, *count as f64 * 100.0 / ok.max(1) as f64);
    }
    if summary.failures > 0 {
        println!("Failures:     {}", summary.failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_rank_percentiles() {
        let samples: Vec<Duration> = (1..=100).map(Duration::from_millis).collect();
        assert_eq!(percentile(&samples, 50), Duration::from_millis(50));
        assert_eq!(percentile(&samples, 99), Duration::from_millis(99));
        assert_eq!(percentile(&[], 99), Duration::ZERO);
    }

    #[test]
    fn labels_by_backend_identity() {
        assert_eq!(backend_label("Hello from backend2 | req=7 | latency=1ms\n"), "Hello from backend2");
        assert_eq!(backend_label("Service unavailable"), "Service unavailable");
    }
}
