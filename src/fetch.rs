//! Single-URL HTTP fetch and storage-name derivation.

use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use opentelemetry_semantic_conventions::attribute::HTTP_RESPONSE_STATUS_CODE;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Time allowed to establish a connection. There is no overall request or
/// read timeout: a slow peer that keeps the connection alive is waited on.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared HTTP client. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("urlq/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and return the whole body.
    ///
    /// Any non-2xx status is an error; the body of such a response is
    /// discarded unread.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();

        metrics::http_responses().add(
            1,
            &[KeyValue::new(
                HTTP_RESPONSE_STATUS_CODE,
                i64::from(status.as_u16()),
            )],
        );

        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(
            url,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "fetched"
        );
        Ok(body.to_vec())
    }
}

/// Storage name for a URL: everything after the last `/`.
///
/// A URL ending in `/` (or naming `.`/`..`) has no usable segment.
pub fn derive_name(url: &str) -> Result<String> {
    match url.rsplit('/').next() {
        Some(name) if !name.is_empty() && name != "." && name != ".." => Ok(name.to_string()),
        _ => Err(Error::InvalidUrl(url.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_last_path_segment() {
        assert_eq!(
            derive_name("https://img.example.com/albums/7/cover.jpg").unwrap(),
            "cover.jpg"
        );
        assert_eq!(derive_name("plain-name").unwrap(), "plain-name");
    }

    #[test]
    fn query_string_stays_in_the_name() {
        assert_eq!(
            derive_name("http://example.com/a/b.png?size=large").unwrap(),
            "b.png?size=large"
        );
    }

    #[test]
    fn trailing_slash_has_no_name() {
        assert!(matches!(
            derive_name("http://example.com/gallery/"),
            Err(Error::InvalidUrl(_))
        ));
        assert!(derive_name("").is_err());
        assert!(derive_name("http://example.com/..").is_err());
    }
}
