//! Tests for a single fetch-and-persist run.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::Fixture;
use urlq::engine::process_item;
use urlq::error::{Error, Result};
use urlq::model::{Outcome, WorkItem};
use urlq::queue::DedupCache;
use urlq::storage::{MemoryStorage, StorageSink};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct BrokenStorage;

#[async_trait]
impl StorageSink for BrokenStorage {
    async fn save(&self, _bytes: &[u8], _name: &str) -> Result<()> {
        Err(Error::Other("disk full".to_string()))
    }
}

#[tokio::test]
async fn saves_payload_under_last_segment_and_marks_completion() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/album/42/photo.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/album/42/photo.jpg", server.uri());
    let fixture = Fixture::new(&[]);
    let storage = Arc::new(MemoryStorage::new());
    let ctx = fixture.context(storage.clone());

    let outcome = process_item(&ctx, &WorkItem::new(url.clone())).await;

    assert_eq!(
        outcome,
        Outcome::Saved {
            name: "photo.jpg".to_string(),
            bytes: 10
        }
    );
    assert_eq!(storage.get("photo.jpg"), Some(b"jpeg bytes".to_vec()));
    assert!(fixture.dedup.contains(&url));
    assert!(fixture.queue.items().is_empty());
}

#[tokio::test]
async fn completed_url_skips_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/done.png", server.uri());
    let fixture = Fixture::new(&[]);
    fixture.dedup.mark(&url).await.unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let ctx = fixture.context(storage.clone());

    let outcome = process_item(&ctx, &WorkItem::new(url)).await;

    assert_eq!(outcome, Outcome::Skipped);
    assert!(storage.is_empty());
    assert!(fixture.queue.items().is_empty());
}

#[tokio::test]
async fn server_error_requeues_without_marking() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/b.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = format!("{}/b.jpg", server.uri());
    let fixture = Fixture::new(&[format!("{}/other.jpg", server.uri())]);
    let storage = Arc::new(MemoryStorage::new());
    let ctx = fixture.context(storage.clone());

    let outcome = process_item(&ctx, &WorkItem::new(url.clone())).await;

    assert!(matches!(outcome, Outcome::Requeued { .. }));
    // Back at the tail, behind what was already waiting.
    let items = fixture.queue.items();
    assert_eq!(items.last(), Some(&WorkItem::new(url.clone())));
    assert_eq!(items.len(), 2);
    assert!(!fixture.dedup.contains(&url));
    assert!(storage.is_empty());
}

#[tokio::test]
async fn not_found_is_treated_like_any_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/missing.gif", server.uri());
    let fixture = Fixture::new(&[]);
    let ctx = fixture.context(Arc::new(MemoryStorage::new()));

    let outcome = process_item(&ctx, &WorkItem::new(url.clone())).await;

    match outcome {
        Outcome::Requeued { error } => assert!(error.contains("404"), "{error}"),
        other => panic!("expected Requeued, got {other:?}"),
    }
    assert_eq!(fixture.queue.items(), vec![WorkItem::new(url)]);
}

#[tokio::test]
async fn url_without_a_name_is_requeued() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>index</html>"))
        .mount(&server)
        .await;

    let url = format!("{}/gallery/", server.uri());
    let fixture = Fixture::new(&[]);
    let storage = Arc::new(MemoryStorage::new());
    let ctx = fixture.context(storage.clone());

    let outcome = process_item(&ctx, &WorkItem::new(url.clone())).await;

    match outcome {
        Outcome::Requeued { error } => assert!(error.contains("invalid url"), "{error}"),
        other => panic!("expected Requeued, got {other:?}"),
    }
    assert!(storage.is_empty());
    assert!(!fixture.dedup.contains(&url));
    assert_eq!(fixture.queue.items(), vec![WorkItem::new(url)]);
}

#[tokio::test]
async fn save_failure_requeues_without_marking() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
        .mount(&server)
        .await;

    let url = format!("{}/c.bin", server.uri());
    let fixture = Fixture::new(&[]);
    let ctx = fixture.context(Arc::new(BrokenStorage));

    let outcome = process_item(&ctx, &WorkItem::new(url.clone())).await;

    assert!(matches!(outcome, Outcome::Requeued { .. }));
    assert!(!fixture.dedup.contains(&url));
    assert_eq!(fixture.queue.items(), vec![WorkItem::new(url)]);
}

#[tokio::test]
async fn connection_refused_is_requeued() {
    // Nothing listens on the discard port.
    let url = "http://127.0.0.1:9/nothing.jpg".to_string();
    let fixture = Fixture::new(&[]);
    let ctx = fixture.context(Arc::new(MemoryStorage::new()));

    let outcome = process_item(&ctx, &WorkItem::new(url.clone())).await;

    assert!(matches!(outcome, Outcome::Requeued { .. }));
    assert_eq!(fixture.queue.items(), vec![WorkItem::new(url)]);
}

#[tokio::test]
async fn failed_push_back_is_reported_as_lost() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fixture = Fixture::new(&[]);
    fixture.queue.set_unavailable(true);
    let ctx = fixture.context(Arc::new(MemoryStorage::new()));

    let outcome = process_item(&ctx, &WorkItem::new(format!("{}/x.jpg", server.uri()))).await;

    assert!(matches!(outcome, Outcome::Lost { .. }));
}
