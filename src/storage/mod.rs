//! Payload persistence.

pub mod disk;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;

pub use disk::LocalDiskStorage;
pub use memory::MemoryStorage;

/// Accepts a downloaded payload and persists it under a name.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn save(&self, bytes: &[u8], name: &str) -> Result<()>;
}
