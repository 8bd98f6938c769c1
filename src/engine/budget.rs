//! Concurrency budget: at most `capacity` tokens exist, and every running
//! download task holds one.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// A held concurrency token. Returned to the budget when dropped.
pub type Token = OwnedSemaphorePermit;

#[derive(Debug, Clone)]
pub struct ConcurrencyBudget {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyBudget {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently out of the pool.
    pub fn held(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Wait for a free token.
    pub async fn acquire(&self) -> Result<Token> {
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::Other("concurrency budget closed".to_string()))
    }
}
