//! # urlq
//!
//! Queue-driven download pipeline. Drains URLs from a durable pgmq queue,
//! fetches them over HTTP under a concurrency cap, saves payloads to a
//! storage sink, skips URLs already completed, and pushes failures back
//! onto the queue for another pass.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod model;
pub mod queue;
pub mod storage;
pub mod telemetry;
