//! Producer: moves items from the durable queue into the ingress buffer.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PipelineContext;
use super::activity::Activity;
use crate::error::Error;
use crate::model::WorkItem;
use crate::telemetry::metrics;

pub(crate) struct Producer {
    pub(crate) ctx: Arc<PipelineContext>,
    pub(crate) tx: mpsc::Sender<WorkItem>,
    pub(crate) stop: CancellationToken,
    pub(crate) activity: Arc<Activity>,
    pub(crate) empty_backoff: Duration,
    pub(crate) error_backoff: Duration,
}

impl Producer {
    /// Pop, push into the buffer, repeat until stopped.
    ///
    /// Suspends while the buffer is full. An item popped but not buffered
    /// when the loop ends is pushed back to the queue tail.
    pub(crate) async fn run(self) {
        debug!("producer started");

        while !self.stop.is_cancelled() {
            // Held from before the pop: the queue may already have dropped
            // the item while the call is still returning.
            self.activity.claim();
            let popped = self.ctx.queue.pop().await;
            if !matches!(popped, Ok(Some(_))) {
                self.activity.release();
            }

            let item = match popped {
                Ok(Some(item)) => item,
                Ok(None) => {
                    if self.pause(self.empty_backoff).await {
                        break;
                    }
                    continue;
                }
                Err(Error::BadPayload(payload)) => {
                    warn!(%payload, "discarding malformed queue message");
                    continue;
                }
                Err(e) => {
                    // No reconnect: the next pop after the backoff is the retry.
                    error!(error = %e, backoff_s = self.error_backoff.as_secs(), "queue pop failed");
                    if self.pause(self.error_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            let slot = tokio::select! {
                biased;
                _ = self.stop.cancelled() => None,
                slot = self.tx.reserve() => slot.ok(),
            };

            match slot {
                Some(slot) => slot.send(item),
                None => {
                    self.hand_back(item).await;
                    break;
                }
            }
        }

        info!("producer stopped");
    }

    /// Sleep for `duration`. Returns `true` if stopped while waiting.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.stop.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    async fn hand_back(&self, item: WorkItem) {
        match self.ctx.queue.push(&item).await {
            Ok(()) => {
                debug!(url = %item, "returned unbuffered item to queue");
                metrics::requeues().add(1, &[KeyValue::new("reason", "handoff")]);
            }
            Err(e) => error!(url = %item, error = %e, "push back to queue failed, item lost"),
        }
        self.activity.release();
    }
}
