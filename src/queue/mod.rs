//! Collaborator contracts for the durable queue and the completion cache.
//!
//! Both are shared with other producers and pipeline instances, so
//! implementations must be safe for concurrent use. Postgres-backed
//! implementations live in [`crate::db`]; in-memory ones in [`memory`].

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::WorkItem;

pub use memory::{MemoryDedup, MemoryQueue};

/// A durable FIFO of work items.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Verify the queue is reachable.
    async fn health_check(&self) -> Result<()>;

    /// Remove and return the item at the front. `Ok(None)` means empty.
    async fn pop(&self) -> Result<Option<WorkItem>>;

    /// Append an item to the tail.
    async fn push(&self, item: &WorkItem) -> Result<()>;

    /// Current number of items in the queue.
    async fn len(&self) -> Result<u64>;
}

/// Records which work items completed successfully.
#[async_trait]
pub trait DedupCache: Send + Sync {
    /// Is there a completion record for `key`?
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Record `key` as completed. Marking an existing key is a no-op.
    async fn mark(&self, key: &str) -> Result<()>;
}
