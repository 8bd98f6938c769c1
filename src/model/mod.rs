//! Core data model.
//!
//! A work item is a URL waiting to be downloaded. It enters the pipeline when
//! popped from the durable queue and leaves it either as a persisted payload
//! with a completion record, or by being pushed back onto the queue.

pub mod work;

pub use work::{Outcome, WorkItem, completion_bucket};
