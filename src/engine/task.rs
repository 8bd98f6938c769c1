//! Fetch-and-persist: the work done for one dispatched item.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use super::PipelineContext;
use super::activity::InFlight;
use super::budget::Token;
use crate::error::Result;
use crate::fetch::derive_name;
use crate::model::{Outcome, WorkItem};
use crate::telemetry::download::{record_result, start_download_span};
use crate::telemetry::metrics;

/// Download one item and settle it.
///
/// Every failure (cache lookup, fetch, non-2xx, body read, name derivation,
/// save) pushes the item back to the queue tail. Nothing is retried here.
/// The completion record is written only after a successful save.
pub async fn process_item(ctx: &PipelineContext, item: &WorkItem) -> Outcome {
    match download(ctx, item).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let error = e.to_string();
            warn!(url = %item, %error, "download failed, requeueing");
            match ctx.queue.push(item).await {
                Ok(()) => {
                    metrics::requeues().add(1, &[KeyValue::new("reason", "failure")]);
                    Outcome::Requeued { error }
                }
                Err(push_err) => {
                    error!(url = %item, error = %push_err, "push back to queue failed, item lost");
                    Outcome::Lost { error }
                }
            }
        }
    }
}

async fn download(ctx: &PipelineContext, item: &WorkItem) -> Result<Outcome> {
    let url = item.url();

    if ctx.dedup.exists(url).await? {
        info!(url, "already downloaded");
        return Ok(Outcome::Skipped);
    }

    info!(url, "downloading");
    let body = ctx.fetcher.fetch(url).await?;
    let name = derive_name(url)?;
    ctx.storage.save(&body, &name).await?;

    // The payload is already persisted; a failed mark is logged, not retried.
    if let Err(e) = ctx.dedup.mark(url).await {
        error!(url, error = %e, "recording completion failed");
    }

    info!(url, name = %name, bytes = body.len(), "saved");
    metrics::download_bytes().record(body.len() as u64, &[]);
    Ok(Outcome::Saved {
        name,
        bytes: body.len(),
    })
}

/// Body of a spawned task. Holds `token` and `in_flight` until the item is
/// settled, then releases both exactly once.
pub(crate) async fn run(
    ctx: Arc<PipelineContext>,
    item: WorkItem,
    token: Token,
    in_flight: InFlight,
    instance: Uuid,
) {
    let span = start_download_span(item.url(), &instance);
    let outcome = process_item(&ctx, &item).instrument(span.clone()).await;

    record_result(&span, outcome.label());
    metrics::downloads().add(1, &[KeyValue::new("result", outcome.label())]);

    drop(in_flight);
    drop(token);
}
