//! Download engine: queue-driven, bounded-concurrency dispatch.

mod activity;
pub mod budget;
pub mod coordinator;
mod producer;
pub mod task;

use std::sync::Arc;

use crate::fetch::Fetcher;
use crate::queue::{DedupCache, QueueClient};
use crate::storage::StorageSink;

pub use budget::ConcurrencyBudget;
pub use coordinator::{Coordinator, CoordinatorConfig, Snapshot};
pub use task::process_item;

/// Everything a download needs, built once and shared by the coordinator,
/// the producer and every task.
pub struct PipelineContext {
    pub queue: Arc<dyn QueueClient>,
    pub dedup: Arc<dyn DedupCache>,
    pub storage: Arc<dyn StorageSink>,
    pub fetcher: Fetcher,
}
