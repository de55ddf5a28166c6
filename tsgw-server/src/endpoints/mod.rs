//! Web server endpoints.
//!
//! This module contains the index route, metric ingestion, the search cluster proxy and the
//! admin endpoints. All routes except the index require authentication.

mod admin;
mod elasticsearch;
mod metrics;
mod statics;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{any, get};

use crate::middlewares;
use crate::service::ServiceState;

pub use self::elasticsearch::{SearchRoute, route_search};

/// Returns all routes of the gateway.
pub fn routes(state: &ServiceState) -> Router<ServiceState> {
    let config = state.config();

    // Route layers only apply to the routes registered before them. The last layer runs first.
    let authenticated = Router::new()
        .route("/metrics", metrics::route(config))
        .route("/elasticsearch/{*path}", any(elasticsearch::handle))
        .route_layer(from_fn_with_state(state.clone(), middlewares::authenticate));

    let admin = Router::new()
        .route("/admin/stats", get(admin::stats))
        .route("/admin/metrics", get(admin::metrics))
        .route_layer(from_fn(middlewares::require_admin))
        .route_layer(from_fn_with_state(state.clone(), middlewares::authenticate));

    Router::new()
        .route("/", get(statics::index))
        .merge(authenticated)
        .merge(admin)
        .fallback(statics::not_found)
}
