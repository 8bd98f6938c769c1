//! In-process queue and cache, for tests and single-process runs.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{DedupCache, QueueClient};
use crate::error::{Error, Result};
use crate::model::WorkItem;

/// A `VecDeque` behind a mutex. `set_unavailable(true)` makes every
/// operation fail as if the connection were down.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<WorkItem>>,
    unavailable: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue pre-filled with `urls`, front first.
    pub fn with_items<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue = Self::new();
        queue.lock().extend(urls.into_iter().map(WorkItem::new));
        queue
    }

    /// Copy of the current contents, front first.
    pub fn items(&self) -> Vec<WorkItem> {
        self.lock().iter().cloned().collect()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Other("memory queue unavailable".to_string()));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<WorkItem>> {
        // A poisoned lock only means another thread panicked mid-push; the
        // deque itself is still consistent.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn health_check(&self) -> Result<()> {
        self.check()
    }

    async fn pop(&self) -> Result<Option<WorkItem>> {
        self.check()?;
        Ok(self.lock().pop_front())
    }

    async fn push(&self, item: &WorkItem) -> Result<()> {
        self.check()?;
        self.lock().push_back(item.clone());
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        self.check()?;
        Ok(self.lock().len() as u64)
    }
}

/// A set of completed keys.
#[derive(Debug, Default)]
pub struct MemoryDedup {
    keys: Mutex<HashSet<String>>,
}

impl MemoryDedup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    pub fn keys(&self) -> HashSet<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.keys.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DedupCache for MemoryDedup {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    async fn mark(&self, key: &str) -> Result<()> {
        self.lock().insert(key.to_string());
        Ok(())
    }
}
