//! Ingestion of metric batches.

use std::io::Read;

use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, post};
use bytes::Bytes;
use tsgw_config::Config;
use tsgw_schema::msg::{MessageError, MetricMessage};
use tsgw_schema::{MetricData, ValidationError};
use tsgw_statsd::metric;

use crate::extractors::{Caller, IngestFormat, RawContentType};
use crate::ingest::normalize_batch;
use crate::service::ServiceState;
use crate::services::PublishError;
use crate::statsd::GatewayDistributions;

/// Reasons an ingestion request fails.
#[derive(Debug, thiserror::Error)]
pub enum BadMetricsRequest {
    #[error("unknown content-type: {0}")]
    UnknownContentType(String),

    #[error("no data included in request")]
    EmptyBody,

    #[error("request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("unable to read request body. {0}")]
    ReadBody(BytesRejection, IngestFormat),

    #[error("unable to decompress request body. {0}")]
    Decompress(#[source] std::io::Error),

    #[error("unable to parse request body. {0}")]
    Json(#[source] serde_json::Error),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to publish metrics: {0}")]
    Publish(#[from] PublishError),
}

impl BadMetricsRequest {
    fn from_rejection(rejection: BytesRejection, format: IngestFormat) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge
        } else {
            Self::ReadBody(rejection, format)
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownContentType(_)
            | Self::EmptyBody
            | Self::Json(_)
            | Self::Message(_)
            | Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ReadBody(_, IngestFormat::Json) => StatusCode::BAD_REQUEST,
            Self::ReadBody(_, _) | Self::Decompress(_) | Self::Publish(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BadMetricsRequest {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tsgw_log::error!(
                error = &self as &dyn std::error::Error,
                "failed to ingest metrics"
            );
        }

        (status, axum::Json(self.to_string())).into_response()
    }
}

/// Decodes a non-empty request body into the submitted records.
fn decode(format: IngestFormat, body: &[u8], limit: usize) -> Result<Vec<MetricData>, BadMetricsRequest> {
    match format {
        IngestFormat::Json => {
            metric!(distribution(GatewayDistributions::PayloadSize) = body.len() as u64);
            serde_json::from_slice(body).map_err(BadMetricsRequest::Json)
        }
        IngestFormat::Binary => decode_message(body),
        IngestFormat::BinarySnappy => decode_message(&decompress(body, limit)?),
    }
}

fn decode_message(body: &[u8]) -> Result<Vec<MetricData>, BadMetricsRequest> {
    metric!(distribution(GatewayDistributions::PayloadSize) = body.len() as u64);
    let message = MetricMessage::parse(body)?;
    Ok(message.decode_metrics()?)
}

/// Decompresses a snappy frame stream of at most `limit` bytes.
fn decompress(body: &[u8], limit: usize) -> Result<Vec<u8>, BadMetricsRequest> {
    let mut decoded = Vec::new();
    snap::read::FrameDecoder::new(body)
        .take(limit as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(BadMetricsRequest::Decompress)?;

    if decoded.len() > limit {
        return Err(BadMetricsRequest::PayloadTooLarge);
    }

    Ok(decoded)
}

async fn handle(
    State(state): State<ServiceState>,
    Caller(identity): Caller,
    content_type: RawContentType,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, BadMetricsRequest> {
    let format = IngestFormat::from_content_type(&content_type)
        .ok_or_else(|| BadMetricsRequest::UnknownContentType(content_type.to_string()))?;
    let body = body.map_err(|rejection| BadMetricsRequest::from_rejection(rejection, format))?;

    if body.is_empty() {
        return Err(BadMetricsRequest::EmptyBody);
    }

    let config = state.config();
    let metrics = decode(format, &body, config.max_payload_size())?;
    let metrics = normalize_batch(state.schema(), identity, config.public_org_id(), metrics)?;

    metric!(distribution(GatewayDistributions::BatchSize) = metrics.len() as u64);
    state.publisher().publish(metrics).await?;

    Ok(axum::Json("ok"))
}

pub fn route(config: &Config) -> MethodRouter<ServiceState> {
    post(handle).route_layer(DefaultBodyLimit::max(config.max_payload_size()))
}
