use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::body::{InterceptedBody, ResponseSummary};
use crate::service::ServiceState;
use crate::stats::path_slug;

/// Records status, latency and response size of every request in the
/// [`RequestStats`](crate::stats::RequestStats) of the service.
///
/// Measurements are taken once the response body has been written, not when the handler returns.
pub async fn request_stats(
    State(state): State<ServiceState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let path = path_slug(request.uri().path());

    let response = next.run(request).await;
    let (parts, body) = response.into_parts();

    let body = InterceptedBody::new(
        body,
        parts.status,
        Box::new(move |summary: ResponseSummary| {
            state
                .stats()
                .record(&path, summary.status(), start.elapsed(), summary.size());
        }),
    );

    Response::from_parts(parts, Body::new(body))
}
