use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tsgw_auth::Identity;

/// Per-request state carried in the request extensions.
///
/// Every request starts out unauthenticated. The authentication middleware replaces the context
/// once the caller's identity is resolved.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    identity: Option<Identity>,
}

impl RequestContext {
    /// Creates the context of an authenticated request.
    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    /// The caller, if the request was authenticated.
    pub fn identity(&self) -> Option<Identity> {
        self.identity
    }
}

/// Attaches an unauthenticated [`RequestContext`] to the request.
pub async fn request_context(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(RequestContext::default());
    next.run(request).await
}
