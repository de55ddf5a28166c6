//! The metrics gateway server application.
//!
//! This module contains the [`run`] function which starts the gateway. It authenticates inbound
//! requests, accepts time series data points in several wire encodings, normalizes them on behalf
//! of the calling organization and hands them to the downstream publisher. Searches against the
//! backing search cluster are proxied with the caller's organization enforced.
//!
//! See the [`Config`] documentation for more information on configuration options.
//!
//! # Path of a Request through the Gateway
//!
//! Every request passes the same middlewares before it reaches an endpoint:
//!
//! 1. **Tracing.** A server span is created that continues the client's trace if the request
//!    carries a `traceparent` or `uber-trace-id` header. Error responses are captured and
//!    attached to the span.
//! 2. **Request stats.** Status code, latency and response size are recorded per normalized
//!    path once the response body has been written. They are kept in the [`RequestStats`]
//!    registry and sent to statsd.
//! 3. **Context.** An unauthenticated request context is attached.
//! 4. **Authentication.** All routes except the index resolve the API key in the
//!    `Authorization` header into the caller's organization. Admins may act on behalf of another
//!    organization with the `X-Tsdb-Org` header.
//!
//! ## Ingestion
//!
//! `POST /metrics` dispatches on the content type:
//!
//! - `application/json`: a JSON array of records.
//! - `rt-metric-binary`: a binary message carrying a JSON or MessagePack array.
//! - `rt-metric-binary-snappy`: a binary message in a snappy frame stream.
//!
//! The records are then normalized. Records of regular callers are always stored in the caller's
//! organization. Admins keep the submitted organization, and public records (organization `-1`)
//! are duplicated into the configured public organization. A single invalid record rejects the
//! whole batch. Accepted batches are published synchronously. The client receives `200` only
//! after the publisher acknowledged the batch.
//!
//! ## Search
//!
//! `/elasticsearch/*` answers the stats of today's index itself and forwards multi-searches to
//! the search cluster, restricted to the caller's organization and public documents.

mod body;
mod constants;
mod endpoints;
mod extractors;
mod ingest;
mod middlewares;
mod service;
mod services;
mod stats;
mod statsd;

#[cfg(test)]
mod testutils;

use std::sync::Arc;

use anyhow::Context;
use tsgw_config::Config;

pub use self::body::ResponseSummary;
pub use self::endpoints::{SearchRoute, route_search};
pub use self::ingest::normalize_batch;
pub use self::middlewares::{RequestContext, RequestSpan, TraceContext};
pub use self::service::{ServiceError, ServiceState};
pub use self::services::{
    DiscardPublisher, ElasticsearchProxy, HttpServer, ProxyError, PublishError, Publisher,
    SearchProxy, ServerError, UnavailableSearchProxy, UpstreamPublisher, make_app,
};
pub use self::stats::{HistogramSummary, PathStats, RequestStats, StatsSnapshot, path_slug};

/// Runs the gateway and blocks until it shuts down.
///
/// This effectively boots the entire server application. It blocks the current thread until a
/// shutdown signal is received or a fatal error happens. Behavior of the server is determined by
/// the `config` passed into this function.
pub fn run(config: Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("tsgw-worker")
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(async move {
        let state = ServiceState::start(Arc::new(config))?;
        let server = HttpServer::bind(state).await?;
        server.serve(services::shutdown_signal()).await?;
        tsgw_log::info!("gateway shutdown complete");
        Ok(())
    })
}
