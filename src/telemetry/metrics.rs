//! Metric instrument factories for urlq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"urlq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for urlq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("urlq")
}

/// Counter: finished fetch-and-persist tasks.
/// Labels: `result` ("saved" | "skipped" | "failed").
pub fn downloads() -> Counter<u64> {
    meter()
        .u64_counter("urlq.downloads")
        .with_description("Number of finished download tasks")
        .build()
}

/// Histogram: size of persisted payloads.
pub fn download_bytes() -> Histogram<u64> {
    meter()
        .u64_histogram("urlq.download.bytes")
        .with_description("Size of persisted payloads")
        .with_unit("By")
        .build()
}

/// Counter: items pushed back to the queue tail.
/// Labels: `reason` ("failure" | "drain" | "handoff").
pub fn requeues() -> Counter<u64> {
    meter()
        .u64_counter("urlq.requeues")
        .with_description("Number of items pushed back onto the queue")
        .build()
}

/// Counter: HTTP responses received.
/// Labels: `http.response.status_code`.
pub fn http_responses() -> Counter<u64> {
    meter()
        .u64_counter("urlq.http.responses")
        .with_description("Number of HTTP responses received")
        .build()
}

/// Counter: queue-level operations (create, send, pop).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("urlq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}
