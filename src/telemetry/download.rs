//! Download span helpers.

use tracing::Span;
use uuid::Uuid;

/// Start a span covering one fetch-and-persist task.
///
/// The `download.result` field is declared empty and filled by
/// [`record_result`].
pub fn start_download_span(url: &str, instance: &Uuid) -> Span {
    tracing::info_span!(
        "download",
        "download.url" = url,
        "coordinator.instance" = %instance,
        "download.result" = tracing::field::Empty,
    )
}

/// Record how the task ended on its span.
pub fn record_result(span: &Span, result: &str) {
    span.record("download.result", result);
}
