//! Administrative endpoints, available to admin keys only.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::service::ServiceState;

/// Returns request statistics of all paths since startup.
pub async fn stats(State(state): State<ServiceState>) -> impl IntoResponse {
    axum::Json(state.stats().snapshot())
}

/// Returns request statistics in the Prometheus text format.
pub async fn metrics(State(state): State<ServiceState>) -> Response {
    match state.stats().encode() {
        Ok(text) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], text).into_response(),
        Err(error) => {
            tsgw_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to encode request stats"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(error.to_string())).into_response()
        }
    }
}
