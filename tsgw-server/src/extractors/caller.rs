use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tsgw_auth::Identity;

use crate::middlewares::{AuthRejection, RequestContext};

/// The authenticated identity of the request.
///
/// Rejects with `401` if the route is not behind the authentication middleware or the request
/// was not authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .and_then(RequestContext::identity)
            .map(Self)
            .ok_or(AuthRejection::MissingKey)
    }
}
