//! Work item types and the queue/cache key conventions.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Suffix appended to the queue name to form the completion bucket.
const COMPLETION_SUFFIX: &str = ":DOWNLOADED";

/// The dedup bucket shared by every item flowing through `queue_name`.
pub fn completion_bucket(queue_name: &str) -> String {
    format!("{queue_name}{COMPLETION_SUFFIX}")
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A single unit of download work, addressed by its URL.
///
/// Opaque to the pipeline: the string is never normalized or parsed beyond
/// deriving a storage name from its last path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem(String);

/// Wire shape of a queue message.
#[derive(Serialize, Deserialize)]
struct Payload {
    url: String,
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn url(&self) -> &str {
        &self.0
    }

    /// Encode as a queue message body.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({ "url": self.0 })
    }

    /// Decode a queue message body. Anything without a `url` string is rejected.
    pub fn from_payload(value: serde_json::Value) -> Result<Self> {
        let payload: Payload = serde_json::from_value(value.clone())
            .map_err(|e| Error::BadPayload(format!("{value}: {e}")))?;
        Ok(Self(payload.url))
    }
}

impl From<String> for WorkItem {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl From<&str> for WorkItem {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a single fetch-and-persist attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload persisted under `name` and the completion recorded.
    Saved { name: String, bytes: usize },
    /// A completion record already existed; nothing was fetched.
    Skipped,
    /// The attempt failed and the item went back to the queue tail.
    Requeued { error: String },
    /// The attempt failed and the push-back failed too. The item is lost.
    Lost { error: String },
}

impl Outcome {
    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Saved { .. } => "saved",
            Outcome::Skipped => "skipped",
            Outcome::Requeued { .. } | Outcome::Lost { .. } => "failed",
        }
    }
}
