use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;
use tracing::field::Empty;

use crate::body::{InterceptedBody, ResponseSummary};
use crate::constants::{COMPONENT, MAX_ERROR_BODY_CAPTURE};
use crate::stats::path_slug;

/// W3C trace context header.
const TRACEPARENT_HEADER: &str = "traceparent";

/// Jaeger trace context header.
const UBER_TRACE_ID_HEADER: &str = "uber-trace-id";

/// Trace context propagated by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceContext {
    /// Hex-encoded trace id, 32 characters.
    pub trace_id: String,
    /// Hex-encoded id of the client's span, 16 characters.
    pub parent_span_id: String,
}

impl TraceContext {
    /// Extracts the trace context from request headers.
    ///
    /// A W3C `traceparent` header takes precedence over a Jaeger `uber-trace-id` header. Malformed
    /// headers are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

        header(TRACEPARENT_HEADER)
            .and_then(Self::parse_traceparent)
            .or_else(|| header(UBER_TRACE_ID_HEADER).and_then(Self::parse_uber_trace_id))
    }

    /// Parses `<version>-<trace-id>-<parent-id>-<flags>`.
    fn parse_traceparent(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_span_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || flags.len() != 2 || version == "ff" {
            return None;
        }

        Self::new(trace_id, parent_span_id)
    }

    /// Parses `<trace-id>:<span-id>:<parent-span-id>:<flags>`.
    fn parse_uber_trace_id(value: &str) -> Option<Self> {
        let mut parts = value.trim().split(':');
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let _parent = parts.next()?;
        let _flags = parts.next()?;

        if trace_id.len() > 32 || span_id.len() > 16 {
            return None;
        }

        let trace_id = format!("{trace_id:0>32}");
        let span_id = format!("{span_id:0>16}");
        Self::new(&trace_id, &span_id)
    }

    fn new(trace_id: &str, parent_span_id: &str) -> Option<Self> {
        let is_id = |id: &str, len: usize| {
            id.len() == len
                && id.bytes().all(|b| b.is_ascii_hexdigit())
                && id.bytes().any(|b| b != b'0')
        };

        if !is_id(trace_id, 32) || !is_id(parent_span_id, 16) {
            return None;
        }

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_span_id: parent_span_id.to_ascii_lowercase(),
        })
    }
}

/// The server span of a request, stored in the request extensions.
#[derive(Clone, Debug)]
pub struct RequestSpan {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    span: tracing::Span,
}

impl RequestSpan {
    fn start(request: &Request) -> Self {
        let context = TraceContext::from_headers(request.headers());
        let (trace_id, parent_span_id) = match context {
            Some(context) => (context.trace_id, Some(context.parent_span_id)),
            None => (format!("{:032x}", rand::random::<u128>()), None),
        };
        let span_id = format!("{:016x}", rand::random::<u64>());

        let method = request.method();
        let name = format!("HTTP {method} {}", path_slug(request.uri().path()));
        let span = tracing::info_span!(
            "http.request",
            otel.name = %name,
            otel.kind = "server",
            component = COMPONENT,
            trace_id = %trace_id,
            span_id = %span_id,
            parent_span_id = parent_span_id.as_deref(),
            http.method = %method,
            http.url = %request.uri(),
            http.status_code = Empty,
            http.size = Empty,
            error = Empty,
        );

        Self {
            trace_id,
            span_id,
            parent_span_id,
            span,
        }
    }

    /// Hex-encoded id of the trace this request belongs to.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Hex-encoded id of the server span.
    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    /// The id of the client's span if the trace was continued.
    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    /// The underlying `tracing` span.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    fn finish(&self, summary: &ResponseSummary) {
        let status = summary.status();
        self.span.record("http.status_code", status.as_u16());

        if status.is_success() {
            self.span.record("http.size", summary.size());
        }

        if status.as_u16() >= 400 {
            let body = summary
                .error_body()
                .map(String::from_utf8_lossy)
                .unwrap_or_default();
            tsgw_log::info!(
                parent: &self.span,
                status = status.as_u16(),
                error.body = %body,
                "request failed"
            );
        }

        if status.is_server_error() {
            self.span.record("error", true);
        }

        if !summary.completed() {
            tsgw_log::debug!(parent: &self.span, "response body dropped before completion");
        }
    }
}

/// Runs the request inside a server span that continues the client's trace.
///
/// The span is finished once the response body is written or dropped. Error responses are
/// captured and attached to the span.
pub async fn trace(mut request: Request, next: Next) -> Response {
    let request_span = RequestSpan::start(&request);
    let span = request_span.span().clone();
    request.extensions_mut().insert(request_span.clone());

    let response = next.run(request).instrument(span).await;
    let (parts, body) = response.into_parts();

    let mut body = InterceptedBody::new(
        body,
        parts.status,
        Box::new(move |summary| request_span.finish(&summary)),
    );
    if parts.status.as_u16() >= 400 {
        body = body.capture(MAX_ERROR_BODY_CAPTURE);
    }

    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fmt;
    use std::sync::Arc;

    use axum::Router;
    use axum::extract::Extension;
    use axum::http::{HeaderValue, StatusCode};
    use axum::routing::get;
    use parking_lot::Mutex;
    use tower::ServiceExt;
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::{LookupSpan, Registry};

    use super::*;
    use crate::testutils::response_body;

    fn headers(name: &'static str, value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_traceparent() {
        let headers = headers(
            TRACEPARENT_HEADER,
            "00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01",
        );
        let context = TraceContext::from_headers(&headers).unwrap();
        assert_eq!(context.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(context.parent_span_id, "00f067aa0ba902b7");
    }

    #[test]
    fn test_traceparent_invalid() {
        for value in [
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736",
            "garbage",
        ] {
            let headers = headers(TRACEPARENT_HEADER, value);
            assert_eq!(TraceContext::from_headers(&headers), None, "{value}");
        }
    }

    #[test]
    fn test_uber_trace_id() {
        let headers = headers(UBER_TRACE_ID_HEADER, "a3ce929d0e0e4736:f067aa0ba902b7:0:1");
        let context = TraceContext::from_headers(&headers).unwrap();
        assert_eq!(context.trace_id, "0000000000000000a3ce929d0e0e4736");
        assert_eq!(context.parent_span_id, "00f067aa0ba902b7");
    }

    #[test]
    fn test_traceparent_takes_precedence() {
        let mut headers = headers(UBER_TRACE_ID_HEADER, "a3ce929d0e0e4736:f067aa0ba902b7:0:1");
        headers.insert(
            TRACEPARENT_HEADER,
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        let context = TraceContext::from_headers(&headers).unwrap();
        assert_eq!(context.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
    }

    async fn span_ids(Extension(span): Extension<RequestSpan>) -> String {
        format!(
            "{} {} {}",
            span.trace_id(),
            span.span_id().len(),
            span.parent_span_id().unwrap_or("-")
        )
    }

    #[tokio::test]
    async fn test_continues_trace() {
        let app = Router::new()
            .route("/", get(span_ids))
            .layer(axum::middleware::from_fn(trace));

        let request = Request::builder()
            .uri("/")
            .header(
                TRACEPARENT_HEADER,
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            )
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response_body(response).await,
            "4bf92f3577b34da6a3ce929d0e0e4736 16 00f067aa0ba902b7"
        );
    }

    #[tokio::test]
    async fn test_starts_new_trace() {
        let app = Router::new()
            .route("/", get(span_ids))
            .layer(axum::middleware::from_fn(trace));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = response_body(response).await;

        let parts: Vec<_> = body.split(' ').collect();
        assert_eq!(parts[0].len(), 32);
        assert_eq!(parts[1], "16");
        assert_eq!(parts[2], "-");
    }

    #[tokio::test]
    async fn test_error_body_is_forwarded() {
        tsgw_log::init_test!();

        let app = Router::new()
            .route(
                "/",
                get(|| async { (StatusCode::BAD_REQUEST, axum::Json("bad input")) }),
            )
            .layer(axum::middleware::from_fn(trace));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response_body(response).await, "\"bad input\"");
    }

    type Fields = BTreeMap<String, String>;

    /// Records the fields of the request span and of all events.
    #[derive(Clone, Default)]
    struct Captured {
        span: Arc<Mutex<Fields>>,
        events: Arc<Mutex<Vec<Fields>>>,
    }

    impl Captured {
        fn span(&self) -> Fields {
            self.span.lock().clone()
        }

        fn failed_event(&self) -> Option<Fields> {
            self.events
                .lock()
                .iter()
                .find(|event| event.get("message").map(String::as_str) == Some("request failed"))
                .cloned()
        }
    }

    struct FieldVisitor<'a>(&'a mut Fields);

    impl Visit for FieldVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_owned(), format!("{value:?}"));
        }
    }

    impl<S> Layer<S> for Captured
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
            if attrs.metadata().name() == "http.request" {
                attrs.record(&mut FieldVisitor(&mut *self.span.lock()));
            }
        }

        fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
            if ctx.span(id).is_some_and(|span| span.name() == "http.request") {
                values.record(&mut FieldVisitor(&mut *self.span.lock()));
            }
        }

        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut fields = Fields::new();
            event.record(&mut FieldVisitor(&mut fields));
            self.events.lock().push(fields);
        }
    }

    async fn traced_request(status: StatusCode, body: &'static str) -> Captured {
        let captured = Captured::default();
        let _guard = tracing::subscriber::set_default(Registry::default().with(captured.clone()));

        let app = Router::new()
            .route("/", get(move || async move { (status, body) }))
            .layer(axum::middleware::from_fn(trace));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), status);
        // The span is finished once the body has been written.
        assert_eq!(response_body(response).await, body);

        captured
    }

    #[tokio::test]
    async fn test_span_fields_success() {
        let captured = traced_request(StatusCode::OK, "ok").await;

        let span = captured.span();
        assert_eq!(span["http.status_code"], "200");
        assert_eq!(span["http.size"], "2");
        assert_eq!(span["otel.name"], "HTTP GET root");
        assert!(!span.contains_key("error"));
        assert_eq!(captured.failed_event(), None);
    }

    #[tokio::test]
    async fn test_span_fields_client_error() {
        let captured = traced_request(StatusCode::BAD_REQUEST, "bad input").await;

        let span = captured.span();
        assert_eq!(span["http.status_code"], "400");
        assert!(!span.contains_key("http.size"));
        assert!(!span.contains_key("error"));

        let event = captured.failed_event().unwrap();
        assert_eq!(event["status"], "400");
        assert_eq!(event["error.body"], "bad input");
    }

    #[tokio::test]
    async fn test_span_fields_server_error() {
        let captured = traced_request(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;

        let span = captured.span();
        assert_eq!(span["http.status_code"], "500");
        assert_eq!(span["error"], "true");
        assert!(!span.contains_key("http.size"));

        let event = captured.failed_event().unwrap();
        assert_eq!(event["error.body"], "boom");
    }
}
