use std::any::Any;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Handler function for the [`CatchPanicLayer`](tower_http::catch_panic::CatchPanicLayer)
/// middleware.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "no error details"
    };

    tsgw_log::error!("panic in web handler: {detail}");

    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(detail)).into_response()
}
