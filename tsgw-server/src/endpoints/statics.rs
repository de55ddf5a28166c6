use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Responds with `200 "ok"`. Used as index page and liveness check.
pub async fn index() -> impl IntoResponse {
    axum::Json("ok")
}

/// An endpoint function that always responds with `404 Not Found`.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, axum::Json("Not Found"))
}
