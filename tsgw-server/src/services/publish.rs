use std::fmt;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::http::header;
use tsgw_schema::MetricData;
use tsgw_schema::msg::{self, Format, MessageError};
use tsgw_statsd::metric;
use url::Url;

use crate::constants::CONTENT_TYPE_BINARY;
use crate::statsd::{GatewayCounters, GatewayTimers};

/// Errors handing a batch to the downstream pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The batch could not be encoded.
    #[error("failed to encode batch")]
    Encode(#[from] MessageError),
    /// The request to the publisher failed.
    #[error("could not send batch to publisher")]
    Send(#[from] reqwest::Error),
    /// The publisher rejected the batch.
    #[error("publisher responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// The downstream pipeline that receives accepted batches.
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a batch. Batches are never retried.
    async fn publish(&self, metrics: Vec<MetricData>) -> Result<(), PublishError>;
}

/// Publishes batches by posting them as binary messages to an HTTP endpoint.
pub struct UpstreamPublisher {
    client: reqwest::Client,
    url: Url,
}

impl UpstreamPublisher {
    /// Creates a publisher posting to `url`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, PublishError> {
        let client = reqwest::ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

impl fmt::Debug for UpstreamPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamPublisher")
            .field("url", &self.url.as_str())
            .finish()
    }
}

/// Returns the current time in nanoseconds, used as message id.
fn message_id() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Publisher for UpstreamPublisher {
    async fn publish(&self, metrics: Vec<MetricData>) -> Result<(), PublishError> {
        let start = Instant::now();
        let count = metrics.len() as i64;
        let body = msg::encode(Format::MetricDataArrayMsgp, message_id(), &metrics)?;

        let result = self
            .client
            .post(self.url.clone())
            .header(header::CONTENT_TYPE, CONTENT_TYPE_BINARY)
            .body(body)
            .send()
            .await;

        let result = match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(PublishError::Status(response.status())),
            Err(error) => Err(PublishError::Send(error)),
        };

        metric!(
            timer(GatewayTimers::PublishDuration) = start.elapsed(),
            result = if result.is_ok() { "success" } else { "failure" },
        );

        if result.is_ok() {
            metric!(counter(GatewayCounters::MetricsPublished) += count);
        }

        result
    }
}

/// Accepts and drops all batches.
///
/// Used when no publisher is configured.
#[derive(Debug, Default)]
pub struct DiscardPublisher;

#[async_trait::async_trait]
impl Publisher for DiscardPublisher {
    async fn publish(&self, metrics: Vec<MetricData>) -> Result<(), PublishError> {
        tsgw_log::trace!(count = metrics.len(), "discarding batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discard() {
        let result = DiscardPublisher
            .publish(vec![MetricData::default(); 3])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let url = Url::parse("http://127.0.0.1:1/metrics").unwrap();
        let publisher = UpstreamPublisher::new(url, Duration::from_secs(1)).unwrap();

        let error = publisher.publish(vec![MetricData::default()]).await;
        assert!(matches!(error, Err(PublishError::Send(_))));
    }

    #[test]
    fn test_message_id_is_recent() {
        // 2020-01-01 in nanoseconds.
        assert!(message_id() > 1_577_836_800_000_000_000);
    }

    #[test]
    fn test_debug_shows_url() {
        let url = Url::parse("http://publisher:6060/metrics").unwrap();
        let publisher = UpstreamPublisher::new(url, Duration::from_secs(1)).unwrap();
        assert_eq!(
            format!("{publisher:?}"),
            r#"UpstreamPublisher { url: "http://publisher:6060/metrics" }"#
        );
    }
}
