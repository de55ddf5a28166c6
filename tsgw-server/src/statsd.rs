use tsgw_statsd::{CounterMetric, DistributionMetric, GaugeMetric, TimerMetric};

/// Gauge metrics used by the gateway.
pub enum GatewayGauges {
    /// Number of distinct request paths tracked by the stats registry.
    TrackedPaths,
}

impl GaugeMetric for GatewayGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::TrackedPaths => "api.request.paths",
        }
    }
}

/// Distribution metrics used by the gateway.
pub enum GatewayDistributions {
    /// Number of metrics in an accepted batch, including public duplicates.
    BatchSize,
    /// Size of an ingestion request body in bytes after decompression.
    PayloadSize,
    /// Size of a successful response in bytes.
    ///
    /// This metric is tagged with:
    /// - `path`: the normalized request path.
    ResponseSize,
}

impl DistributionMetric for GatewayDistributions {
    fn name(&self) -> &'static str {
        match self {
            Self::BatchSize => "metrics.http.batch_size",
            Self::PayloadSize => "metrics.http.payload_size",
            Self::ResponseSize => "api.request.size",
        }
    }
}

/// Timer metrics used by the gateway.
pub enum GatewayTimers {
    /// Time spent resolving an API key with the auth backend.
    AuthDuration,
    /// Time spent handing a batch to the publisher.
    ///
    /// This metric is tagged with:
    /// - `result`: `success` or `failure`.
    PublishDuration,
    /// Time until the search cluster answered a proxied query.
    SearchProxyDuration,
    /// Time until the response body of a request that did not end in `404` was written.
    ///
    /// This metric is tagged with:
    /// - `path`: the normalized request path.
    RequestDuration,
}

impl TimerMetric for GatewayTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::AuthDuration => "auth.duration",
            Self::PublishDuration => "publish.duration",
            Self::SearchProxyDuration => "search.proxy.duration",
            Self::RequestDuration => "api.request.duration",
        }
    }
}

/// Counter metrics used by the gateway.
pub enum GatewayCounters {
    /// Number of metrics accepted for publishing, including public duplicates.
    MetricsValid,
    /// Number of metrics rejected because a record of their batch failed validation.
    MetricsRejected,
    /// Number of metrics successfully handed to the publisher.
    MetricsPublished,
    /// Number of failed authentication attempts.
    ///
    /// This metric is tagged with:
    /// - `reason`: `header`, `missing`, `credentials` or `backend`.
    AuthFailed,
    /// Number of requests per path and status code, except `404`.
    ///
    /// This metric is tagged with:
    /// - `path`: the normalized request path.
    /// - `status`: the response status code.
    RequestStatus,
    /// Number of times the server was started.
    ServerStarting,
}

impl CounterMetric for GatewayCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::MetricsValid => "metrics.http.valid",
            Self::MetricsRejected => "metrics.http.rejected",
            Self::MetricsPublished => "metrics.published",
            Self::AuthFailed => "auth.failed",
            Self::RequestStatus => "api.request.status",
            Self::ServerStarting => "server.starting",
        }
    }
}
