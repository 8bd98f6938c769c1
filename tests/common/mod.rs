//! Shared fixtures: in-memory collaborators and fast coordinator timings.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use urlq::engine::{CoordinatorConfig, PipelineContext};
use urlq::fetch::Fetcher;
use urlq::queue::{MemoryDedup, MemoryQueue};
use urlq::storage::StorageSink;

pub struct Fixture {
    pub queue: Arc<MemoryQueue>,
    pub dedup: Arc<MemoryDedup>,
}

impl Fixture {
    pub fn new(urls: &[String]) -> Self {
        Self {
            queue: Arc::new(MemoryQueue::with_items(urls.iter().cloned())),
            dedup: Arc::new(MemoryDedup::new()),
        }
    }

    pub fn context(&self, storage: Arc<dyn StorageSink>) -> PipelineContext {
        PipelineContext {
            queue: self.queue.clone(),
            dedup: self.dedup.clone(),
            storage,
            fetcher: Fetcher::new().expect("http client"),
        }
    }
}

/// Coordinator timings scaled down so tests finish in milliseconds.
pub fn fast_config(concurrency: usize, buffer_factor: usize) -> CoordinatorConfig {
    CoordinatorConfig {
        concurrency,
        buffer_factor,
        queue_name: "test_urls".to_string(),
        status_interval: Duration::from_millis(50),
        quiesce_poll_interval: Duration::from_millis(10),
        empty_backoff: Duration::from_millis(10),
        error_backoff: Duration::from_millis(20),
    }
}

/// Poll `cond` every 5ms; panic after 10s.
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
