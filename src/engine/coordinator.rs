//! Coordinator: owns the concurrency budget, runs the producer, dispatches
//! buffered items within the budget, and drains the buffer on stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::PipelineContext;
use super::activity::Activity;
use super::budget::{ConcurrencyBudget, Token};
use super::producer::Producer;
use super::task;
use crate::config::{Config, DEFAULT_BUFFER_FACTOR, DEFAULT_CONCURRENCY, DEFAULT_QUEUE};
use crate::error::{Error, Result};
use crate::model::WorkItem;
use crate::telemetry::metrics;

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum concurrent download tasks.
    pub concurrency: usize,
    /// Ingress buffer capacity is `concurrency * buffer_factor`.
    pub buffer_factor: usize,
    /// Queue name, for logs.
    pub queue_name: String,
    /// How often the dispatch loop logs buffer depth and active count.
    pub status_interval: Duration,
    /// How often `wait_until_quiescent` re-checks.
    pub quiesce_poll_interval: Duration,
    /// Producer sleep after an empty pop.
    pub empty_backoff: Duration,
    /// Producer sleep after a failed pop.
    pub error_backoff: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            buffer_factor: DEFAULT_BUFFER_FACTOR,
            queue_name: DEFAULT_QUEUE.to_string(),
            status_interval: Duration::from_secs(2),
            quiesce_poll_interval: Duration::from_secs(1),
            empty_backoff: Duration::from_secs(5),
            error_backoff: Duration::from_secs(10),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            buffer_factor: config.buffer_factor,
            queue_name: config.queue.clone(),
            ..Self::default()
        }
    }

    pub fn buffer_capacity(&self) -> usize {
        self.concurrency.saturating_mul(self.buffer_factor)
    }
}

/// Point-in-time view of local activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Items popped from the queue and not yet dispatched.
    pub buffered: usize,
    /// Running download tasks.
    pub in_flight: usize,
    /// Concurrency tokens out of the pool, including one the dispatch loop
    /// may be holding while it waits for an item.
    pub tokens_held: usize,
}

/// Why the dispatch loop returned.
enum Exit {
    Stopped,
    Fatal(Error),
}

/// The download coordinator. Clones share the same instance.
pub struct Coordinator {
    ctx: Arc<PipelineContext>,
    config: CoordinatorConfig,
    budget: ConcurrencyBudget,
    activity: Arc<Activity>,
    stop: CancellationToken,
    started: Arc<AtomicBool>,
    instance: Uuid,
}

impl Clone for Coordinator {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            config: self.config.clone(),
            budget: self.budget.clone(),
            activity: Arc::clone(&self.activity),
            stop: self.stop.clone(),
            started: Arc::clone(&self.started),
            instance: self.instance,
        }
    }
}

impl Coordinator {
    pub fn new(ctx: PipelineContext, config: CoordinatorConfig) -> Result<Self> {
        if config.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if config.buffer_factor == 0 {
            return Err(Error::Config("buffer_factor must be at least 1".to_string()));
        }

        Ok(Self {
            ctx: Arc::new(ctx),
            budget: ConcurrencyBudget::new(config.concurrency),
            config,
            activity: Arc::new(Activity::default()),
            stop: CancellationToken::new(),
            started: Arc::new(AtomicBool::new(false)),
            instance: Uuid::new_v4(),
        })
    }

    /// Identifies this coordinator among instances sharing a queue.
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            buffered: self.activity.held(),
            in_flight: self.activity.in_flight(),
            tokens_held: self.budget.held(),
        }
    }

    /// Raise the stop signal. Returns immediately; running downloads are
    /// left to finish on their own.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!(instance = %self.instance, "stop requested");
        }
        self.stop.cancel();
    }

    /// Run the pipeline until stopped.
    ///
    /// Starts the producer, dispatches buffered items while tokens are
    /// free, and logs status every `status_interval`. On stop, every item
    /// still buffered is pushed back to the queue tail before this returns.
    /// Runs once per instance; later calls return immediately.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(instance = %self.instance, "coordinator already started");
            return;
        }

        if let Err(e) = self.ctx.queue.health_check().await {
            error!(error = %e, "start failed: queue unreachable");
            return;
        }

        let (tx, mut rx) = mpsc::channel(self.config.buffer_capacity());
        let producer = Producer {
            ctx: Arc::clone(&self.ctx),
            tx,
            stop: self.stop.clone(),
            activity: Arc::clone(&self.activity),
            empty_backoff: self.config.empty_backoff,
            error_backoff: self.config.error_backoff,
        };
        let producer = tokio::spawn(producer.run());

        info!(
            instance = %self.instance,
            queue = %self.config.queue_name,
            concurrency = self.config.concurrency,
            buffer_capacity = self.config.buffer_capacity(),
            "coordinator started"
        );

        if let Exit::Fatal(e) = self.dispatch(&mut rx).await {
            // Restarting is the caller's job.
            error!(error = %e, "dispatch loop exiting");
        }

        self.drain(&mut rx).await;

        if let Err(e) = producer.await {
            error!(error = %e, "producer task failed");
        }

        info!(instance = %self.instance, "coordinator stopped");
    }

    /// Dispatch loop. Each turn takes whichever of stop, status tick, token
    /// or item is ready; stop wins ties, then the tick, so neither can be
    /// starved by a steady stream of work.
    async fn dispatch(&self, rx: &mut mpsc::Receiver<WorkItem>) -> Exit {
        let period = self.config.status_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // A token acquired ahead of the item it will run.
        let mut slot: Option<Token> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Exit::Stopped,
                _ = ticker.tick() => self.report_status(),
                token = self.budget.acquire(), if slot.is_none() => match token {
                    Ok(token) => slot = Some(token),
                    Err(e) => return Exit::Fatal(e),
                },
                item = rx.recv(), if slot.is_some() => {
                    let Some(item) = item else {
                        if self.stop.is_cancelled() {
                            return Exit::Stopped;
                        }
                        // Every sender is gone: the producer died.
                        return Exit::Fatal(Error::Other("ingress buffer closed".to_string()));
                    };
                    if let Some(token) = slot.take() {
                        self.launch(item, token);
                    }
                }
            }
        }
    }

    fn launch(&self, item: WorkItem, token: Token) {
        let in_flight = self.activity.dispatch();
        tokio::spawn(task::run(
            Arc::clone(&self.ctx),
            item,
            token,
            in_flight,
            self.instance,
        ));
    }

    fn report_status(&self) {
        let snapshot = self.snapshot();
        info!(
            queued = snapshot.buffered,
            active = snapshot.tokens_held,
            capacity = self.budget.capacity(),
            in_flight = snapshot.in_flight,
            "status"
        );
    }

    /// Push every buffered item back to the queue tail.
    async fn drain(&self, rx: &mut mpsc::Receiver<WorkItem>) {
        rx.close();

        let mut returned = 0usize;
        while let Some(item) = rx.recv().await {
            match self.ctx.queue.push(&item).await {
                Ok(()) => {
                    returned += 1;
                    metrics::requeues().add(1, &[KeyValue::new("reason", "drain")]);
                }
                Err(e) => error!(url = %item, error = %e, "push back to queue failed, item lost"),
            }
            self.activity.release();
        }

        info!(returned, "ingress buffer drained");
    }

    /// Block until the queue is empty, nothing is buffered, and no download
    /// is running.
    ///
    /// Best effort: the queue is shared, so another instance can claim or
    /// add work right after this returns.
    pub async fn wait_until_quiescent(&self) {
        loop {
            match self.is_quiescent().await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => error!(error = %e, "queue length check failed"),
            }

            tokio::select! {
                _ = self.activity.settled() => {}
                _ = tokio::time::sleep(self.config.quiesce_poll_interval) => {}
            }
        }
    }

    /// One quiescence check. Local state is sampled on both sides of the
    /// queue read. The producer counts an item as held before its pop is
    /// sent, so an item this process is taking off the queue shows up either
    /// in the queue length or in one of the two samples.
    pub async fn is_quiescent(&self) -> Result<bool> {
        let before = self.snapshot();
        let queued = self.ctx.queue.len().await?;
        let after = self.snapshot();

        Ok(queued == 0 && idle(before) && idle(after))
    }
}

/// At most the dispatch loop's own parked token may be out.
fn idle(snapshot: Snapshot) -> bool {
    snapshot.buffered == 0 && snapshot.in_flight == 0 && snapshot.tokens_held < 2
}
