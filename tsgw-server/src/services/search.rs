use std::fmt;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tsgw_auth::NO_ORG;
use tsgw_statsd::metric;
use url::Url;

use crate::statsd::GatewayTimers;

/// Headers that this proxy must handle and cannot forward.
static HOP_BY_HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Headers ignored in addition to the headers defined in `HOP_BY_HOP_HEADERS`.
static IGNORED_REQUEST_HEADERS: &[HeaderName] = &[
    header::HOST,
    header::AUTHORIZATION,
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
];

/// Errors which may occur when proxying a search.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No search cluster is configured.
    #[error("search is not available")]
    Unavailable,
    /// The request body could not be read.
    #[error("failed to read request body")]
    ReadBody(#[source] axum::Error),
    /// A line of the multi-search body is not valid JSON.
    #[error("invalid search body on line {line}")]
    InvalidQuery {
        /// One-based line number of the offending line.
        line: usize,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// A query line of the multi-search body is not a JSON object.
    #[error("search query on line {line} is not an object")]
    QueryNotObject {
        /// One-based line number of the offending line.
        line: usize,
    },
    /// The request to the search cluster failed.
    #[error("error while forwarding search request")]
    Upstream(#[from] reqwest::Error),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReadBody(_) | Self::InvalidQuery { .. } | Self::QueryNotObject { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::Upstream(error) if error.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(error) if error.is_connect() || error.is_request() => {
                StatusCode::BAD_GATEWAY
            }
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tsgw_log::error!(
                error = &self as &dyn std::error::Error,
                "failed to proxy search request"
            );
        }

        (status, axum::Json(self.to_string())).into_response()
    }
}

/// The search cluster behind the `/elasticsearch` routes.
#[async_trait::async_trait]
pub trait SearchProxy: Send + Sync {
    /// Runs a multi-search on behalf of `org_id` and returns the cluster's response.
    async fn proxy(&self, org_id: i64, request: Request) -> Result<Response, ProxyError>;
}

/// Restricts every query of a multi-search body to an organization and public documents.
///
/// Multi-search bodies are newline-delimited JSON in which header lines alternate with query
/// lines. Each query is wrapped in a boolean filter on `org_id`.
pub fn restrict_msearch(body: &[u8], org_id: i64) -> Result<Vec<u8>, ProxyError> {
    let filter = json!({"terms": {"org_id": [org_id, NO_ORG]}});
    let mut output = Vec::with_capacity(body.len() + 64);

    let lines = body
        .split(|&b| b == b'\n')
        .enumerate()
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace));

    for (query_index, (index, line)) in lines.enumerate() {
        let parsed: Value = serde_json::from_slice(line).map_err(|source| {
            ProxyError::InvalidQuery {
                line: index + 1,
                source,
            }
        })?;

        let value = if query_index % 2 == 0 {
            // header line
            parsed
        } else {
            restrict_query(parsed, &filter)
                .ok_or(ProxyError::QueryNotObject { line: index + 1 })?
        };

        serde_json::to_writer(&mut output, &value).map_err(|source| ProxyError::InvalidQuery {
            line: index + 1,
            source,
        })?;
        output.push(b'\n');
    }

    Ok(output)
}

/// Returns `None` if the query is not an object and cannot be restricted.
fn restrict_query(mut search: Value, filter: &Value) -> Option<Value> {
    let object = search.as_object_mut()?;

    let restricted = match object.remove("query") {
        Some(query) => json!({"bool": {"must": [query], "filter": [filter]}}),
        None => json!({"bool": {"filter": [filter]}}),
    };
    object.insert("query".to_owned(), restricted);

    Some(search)
}

fn forwarded_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| {
            !HOP_BY_HOP_HEADERS.contains(*name) && !IGNORED_REQUEST_HEADERS.contains(*name)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Proxies multi-searches to an Elasticsearch cluster.
pub struct ElasticsearchProxy {
    client: reqwest::Client,
    url: Url,
    max_body_size: usize,
}

impl ElasticsearchProxy {
    /// Creates a proxy for the cluster at `url`.
    pub fn new(url: Url, timeout: Duration, max_body_size: usize) -> Result<Self, ProxyError> {
        let client = reqwest::ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            max_body_size,
        })
    }

    fn msearch_url(&self) -> Url {
        let mut url = self.url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("_msearch");
        }
        url
    }
}

impl fmt::Debug for ElasticsearchProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElasticsearchProxy")
            .field("url", &self.url.as_str())
            .finish()
    }
}

#[async_trait::async_trait]
impl SearchProxy for ElasticsearchProxy {
    async fn proxy(&self, org_id: i64, request: Request) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();
        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(ProxyError::ReadBody)?;
        let body = restrict_msearch(&body, org_id)?;

        let start = Instant::now();
        let response = self
            .client
            .post(self.msearch_url())
            .headers(forwarded_headers(&parts.headers))
            .header(header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await;
        metric!(timer(GatewayTimers::SearchProxyDuration) = start.elapsed());

        let response = response?;
        let status = response.status();
        let mut headers = response.headers().clone();
        for header in HOP_BY_HOP_HEADERS {
            headers.remove(header);
        }

        let body = Body::from_stream(response.bytes_stream());
        Ok((status, headers, body).into_response())
    }
}

/// Rejects all searches with `503 Service Unavailable`.
///
/// Used when no search cluster is configured.
#[derive(Debug, Default)]
pub struct UnavailableSearchProxy;

#[async_trait::async_trait]
impl SearchProxy for UnavailableSearchProxy {
    async fn proxy(&self, _org_id: i64, _request: Request) -> Result<Response, ProxyError> {
        Err(ProxyError::Unavailable)
    }
}
