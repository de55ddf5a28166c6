//! Routing of requests to the search cluster.

use axum::extract::{Path, Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{NaiveDate, Utc};

use crate::extractors::Caller;
use crate::service::ServiceState;

/// The destination of a request below `/elasticsearch/`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchRoute {
    /// Stats of today's index, answered by the gateway itself.
    IndexStats,
    /// A multi-search forwarded to the cluster.
    MultiSearch,
    /// Everything else.
    NotFound,
}

/// Resolves the route of a request for `path` below `/elasticsearch/`.
///
/// Only the stats of the index for `today` are answered. Indices are named
/// `<index_name>-<YYYY-MM-DD>`.
pub fn route_search(method: &Method, path: &str, index_name: &str, today: NaiveDate) -> SearchRoute {
    if *method == Method::GET {
        let index = format!("{index_name}-{}", today.format("%Y-%m-%d"));
        if path.strip_suffix("/_stats") == Some(index.as_str()) {
            return SearchRoute::IndexStats;
        }
    }

    if *method == Method::POST && path == "_msearch" {
        return SearchRoute::MultiSearch;
    }

    SearchRoute::NotFound
}

pub async fn handle(
    State(state): State<ServiceState>,
    Caller(identity): Caller,
    Path(path): Path<String>,
    request: Request,
) -> Response {
    let today = Utc::now().date_naive();
    let index_name = state.config().search_index_name();

    let route = route_search(request.method(), &path, index_name, today);

    match route {
        SearchRoute::IndexStats => axum::Json("ok").into_response(),
        SearchRoute::MultiSearch => match state.search().proxy(identity.org_id, request).await {
            Ok(response) => response,
            Err(error) => error.into_response(),
        },
        SearchRoute::NotFound => (StatusCode::NOT_FOUND, axum::Json("Not Found")).into_response(),
    }
}
