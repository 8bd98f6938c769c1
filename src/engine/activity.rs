//! Local bookkeeping shared by the producer, the dispatch loop and tasks.
//!
//! `held` counts items taken from the queue that have not yet been handed
//! to a task: the ingress buffer's contents plus at most one item in the
//! producer's hand, counted from the moment its pop is issued. `in_flight`
//! counts running tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
pub(crate) struct Activity {
    held: AtomicUsize,
    in_flight: AtomicUsize,
    settled: Notify,
}

impl Activity {
    pub(crate) fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The producer is taking an item off the queue.
    pub(crate) fn claim(&self) {
        self.held.fetch_add(1, Ordering::SeqCst);
    }

    /// A held item went back onto the queue (call after the push), or a
    /// pop came back without one.
    pub(crate) fn release(&self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
        self.settled.notify_waiters();
    }

    /// A held item is becoming a task. `in_flight` rises before `held`
    /// falls, so the item is never invisible to an observer.
    pub(crate) fn dispatch(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.held.fetch_sub(1, Ordering::SeqCst);
        InFlight {
            activity: Arc::clone(self),
        }
    }

    /// Resolves on the next release or task exit.
    pub(crate) async fn settled(&self) {
        self.settled.notified().await;
    }
}

/// Marks one running task. Dropping it ends the task's accounting.
#[derive(Debug)]
pub(crate) struct InFlight {
    activity: Arc<Activity>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.activity.settled.notify_waiters();
    }
}
