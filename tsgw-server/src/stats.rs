//! Per-path request statistics.
//!
//! The [`RequestStats`] registry is shared by all requests of the server. It is backed by a
//! Prometheus registry. Handles for a path are created lazily under a single lock, after which
//! all updates happen on the handle without holding it. Entries are never removed.
//!
//! Every recorded request is also sent to statsd, where it is aggregated.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;
use parking_lot::Mutex;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;
use tsgw_statsd::metric;

use crate::statsd::{GatewayCounters, GatewayDistributions, GatewayGauges, GatewayTimers};

/// Buckets of the response size histogram in bytes, from 64B to 16MiB.
const SIZE_BUCKETS: (f64, f64, usize) = (64.0, 4.0, 10);

/// Normalizes a request path into a key usable in metric names.
///
/// The path is lexically cleaned, the leading slash is stripped, the empty path becomes `root`,
/// and slashes and dots are replaced with underscores.
///
/// ```ignore
/// assert_eq!(path_slug("/a/b.c"), "a_b_c");
/// assert_eq!(path_slug("/"), "root");
/// ```
pub fn path_slug(path: &str) -> String {
    let cleaned = clean_path(path);
    let slug = cleaned.strip_prefix('/').unwrap_or(&cleaned);
    let slug = if slug.is_empty() { "root" } else { slug };
    slug.replace(['/', '.'], "_")
}

/// Returns the shortest path equivalent to `path` by purely lexical processing.
///
/// Repeated slashes are collapsed, `.` elements are removed and `..` elements are resolved
/// against their parent. `..` at the root of an absolute path is dropped.
fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }

    let rooted = path.starts_with('/');
    let mut elements: Vec<&str> = Vec::new();

    for element in path.split('/') {
        match element {
            "" | "." => {}
            ".." => match elements.last() {
                Some(&last) if last != ".." => {
                    elements.pop();
                }
                _ if rooted => {}
                _ => elements.push(".."),
            },
            other => elements.push(other),
        }
    }

    let joined = elements.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_owned(),
        (false, false) => joined,
    }
}

/// Observations of a histogram.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramSummary {
    /// Number of observations.
    pub count: u64,
    /// Sum of all observed values.
    pub sum: f64,
    /// Average of the observed values.
    pub mean: f64,
}

impl HistogramSummary {
    fn of(histogram: &Histogram) -> Option<Self> {
        let count = histogram.get_sample_count();
        let sum = histogram.get_sample_sum();

        (count > 0).then(|| Self {
            count,
            sum,
            mean: sum / count as f64,
        })
    }
}

/// Statistics of a single path since startup.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PathStats {
    /// Request counts by status code.
    pub statuses: BTreeMap<u16, u64>,
    /// Latencies in seconds of requests that did not end in `404`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<HistogramSummary>,
    /// Sizes in bytes of successful responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<HistogramSummary>,
}

/// Statistics of all tracked paths.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Statistics keyed by path slug.
    pub paths: BTreeMap<String, PathStats>,
}

/// Handles resolved for a single path.
#[derive(Default)]
struct PathHandles {
    statuses: BTreeMap<u16, IntCounter>,
    latency: Option<Histogram>,
    size: Option<Histogram>,
}

/// Registry of request counters, latencies and response sizes keyed by path.
pub struct RequestStats {
    registry: Registry,
    requests: IntCounterVec,
    latencies: HistogramVec,
    sizes: HistogramVec,
    handles: Mutex<BTreeMap<String, PathHandles>>,
}

impl RequestStats {
    /// Creates an empty registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new("tsgw_http_requests_total", "Requests by path and status code"),
            &["path", "status"],
        )?;

        let latencies = HistogramVec::new(
            HistogramOpts::new(
                "tsgw_http_request_duration_seconds",
                "Request latency by path",
            ),
            &["path"],
        )?;

        let (start, factor, count) = SIZE_BUCKETS;
        let sizes = HistogramVec::new(
            HistogramOpts::new(
                "tsgw_http_response_size_bytes",
                "Size of successful responses by path",
            )
            .buckets(prometheus::exponential_buckets(start, factor, count)?),
            &["path"],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latencies.clone()))?;
        registry.register(Box::new(sizes.clone()))?;

        Ok(Self {
            registry,
            requests,
            latencies,
            sizes,
            handles: Mutex::new(BTreeMap::new()),
        })
    }

    /// Records a completed request.
    ///
    /// Requests answered with `404` are not counted. Response sizes are only recorded for
    /// successful requests.
    pub fn record(&self, path: &str, status: StatusCode, latency: Duration, size: u64) {
        if status == StatusCode::NOT_FOUND {
            return;
        }

        let (tracked, counter, histogram, meter) = {
            let mut handles = self.handles.lock();
            let tracked = (!handles.contains_key(path)).then(|| {
                handles.insert(path.to_owned(), PathHandles::default());
                handles.len() as u64
            });
            let Some(entry) = handles.get_mut(path) else {
                return;
            };

            let counter = entry
                .statuses
                .entry(status.as_u16())
                .or_insert_with(|| self.requests.with_label_values(&[path, status.as_str()]))
                .clone();
            let histogram = entry
                .latency
                .get_or_insert_with(|| self.latencies.with_label_values(&[path]))
                .clone();
            let meter = (status.as_u16() < 300).then(|| {
                entry
                    .size
                    .get_or_insert_with(|| self.sizes.with_label_values(&[path]))
                    .clone()
            });

            (tracked, counter, histogram, meter)
        };

        if let Some(paths) = tracked {
            metric!(gauge(GatewayGauges::TrackedPaths) = paths);
        }

        counter.inc();
        metric!(
            counter(GatewayCounters::RequestStatus) += 1,
            path = path,
            status = status.as_str(),
        );

        histogram.observe(latency.as_secs_f64());
        metric!(timer(GatewayTimers::RequestDuration) = latency, path = path);

        if let Some(meter) = meter {
            meter.observe(size as f64);
            metric!(distribution(GatewayDistributions::ResponseSize) = size, path = path);
        }
    }

    /// Returns the number of distinct paths seen so far.
    pub fn path_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Returns the statistics of all paths since startup.
    pub fn snapshot(&self) -> StatsSnapshot {
        let handles = self.handles.lock();
        let mut snapshot = StatsSnapshot::default();

        for (path, entry) in handles.iter() {
            let stats = PathStats {
                statuses: entry
                    .statuses
                    .iter()
                    .map(|(status, counter)| (*status, counter.get()))
                    .collect(),
                latency: entry.latency.as_ref().and_then(HistogramSummary::of),
                size: entry.size.as_ref().and_then(HistogramSummary::of),
            };
            snapshot.paths.insert(path.clone(), stats);
        }

        snapshot
    }

    /// Encodes all statistics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|error| prometheus::Error::Msg(error.to_string()))
    }
}

impl fmt::Debug for RequestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStats")
            .field("paths", &self.path_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use tsgw_statsd::with_capturing_test_client;

    use super::*;

    #[test]
    fn test_path_slug() {
        assert_eq!(path_slug("/a/b.c"), "a_b_c");
        assert_eq!(path_slug("/"), "root");
        assert_eq!(path_slug(""), "_");
        assert_eq!(path_slug("/metrics"), "metrics");
        assert_eq!(path_slug("//metrics/"), "metrics");
        assert_eq!(
            path_slug("/elasticsearch/events-2024-01-01/_stats"),
            "elasticsearch_events-2024-01-01__stats"
        );
        assert_eq!(path_slug("/a/./b/../c"), "a_c");
        assert_eq!(path_slug("/../.."), "root");
    }

    #[test]
    fn test_path_slug_idempotent() {
        for path in ["/", "/a/b.c", "/x//y/../z.w", "/elasticsearch/_msearch", "rel/path"] {
            let slug = path_slug(path);
            assert_eq!(path_slug(&slug), slug, "{path}");
        }
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("a/../.."), "..");
        assert_eq!(clean_path("a/.."), ".");
        assert_eq!(clean_path("/a/b/"), "/a/b");
        assert_eq!(clean_path("../a"), "../a");
    }

    #[test]
    fn test_record_rules() {
        let stats = RequestStats::new().unwrap();
        stats.record("metrics", StatusCode::OK, Duration::from_millis(3), 4);
        stats.record("metrics", StatusCode::BAD_REQUEST, Duration::from_millis(1), 20);
        stats.record("missing", StatusCode::NOT_FOUND, Duration::from_millis(1), 9);

        let snapshot = stats.snapshot();

        let metrics = &snapshot.paths["metrics"];
        assert_eq!(metrics.statuses, BTreeMap::from([(200, 1), (400, 1)]));
        assert_eq!(metrics.latency.as_ref().map(|l| l.count), Some(2));
        assert_eq!(
            metrics.size,
            Some(HistogramSummary {
                count: 1,
                sum: 4.0,
                mean: 4.0,
            })
        );

        // 404s are neither counted nor timed, and they are not successful.
        assert!(!snapshot.paths.contains_key("missing"));
    }

    #[test]
    fn test_record_emits_statsd() {
        let stats = RequestStats::new().unwrap();
        let captures = with_capturing_test_client(|| {
            stats.record("metrics", StatusCode::OK, Duration::from_millis(2), 4);
            stats.record("metrics", StatusCode::UNAUTHORIZED, Duration::from_millis(1), 0);
            stats.record("missing", StatusCode::NOT_FOUND, Duration::from_millis(1), 9);
        });

        assert_eq!(
            captures,
            [
                "api.request.paths:1|g",
                "api.request.status:1|c|#path:metrics,status:200",
                "api.request.duration:2|d|#path:metrics",
                "api.request.size:4|d|#path:metrics",
                "api.request.status:1|c|#path:metrics,status:401",
                "api.request.duration:1|d|#path:metrics",
            ]
        );
    }

    #[test]
    fn test_snapshot_is_cumulative() {
        let stats = RequestStats::new().unwrap();
        stats.record("root", StatusCode::OK, Duration::from_millis(1), 1);
        stats.record("root", StatusCode::OK, Duration::from_millis(1), 1);
        assert_eq!(stats.snapshot().paths["root"].statuses[&200], 2);

        stats.record("root", StatusCode::OK, Duration::from_millis(1), 1);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.paths["root"].statuses[&200], 3);
        assert_eq!(snapshot.paths["root"].size.as_ref().map(|s| s.count), Some(3));
    }

    #[test]
    fn test_encode() {
        let stats = RequestStats::new().unwrap();
        stats.record("metrics", StatusCode::OK, Duration::from_millis(5), 100);

        let text = stats.encode().unwrap();
        assert!(text.contains(r#"tsgw_http_requests_total{path="metrics",status="200"} 1"#));
        assert!(text.contains(r#"tsgw_http_request_duration_seconds_count{path="metrics"} 1"#));
        assert!(text.contains(r#"tsgw_http_response_size_bytes_sum{path="metrics"} 100"#));
    }

    #[test]
    fn test_path_count() {
        let stats = RequestStats::new().unwrap();
        stats.record("a", StatusCode::OK, Duration::ZERO, 0);
        stats.record("a", StatusCode::CREATED, Duration::ZERO, 0);
        stats.record("b", StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO, 0);
        stats.record("c", StatusCode::NOT_FOUND, Duration::ZERO, 0);
        assert_eq!(stats.path_count(), 2);
    }
}
