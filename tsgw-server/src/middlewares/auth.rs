use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tsgw_auth::AuthError;
use tsgw_statsd::metric;

use crate::constants::ORG_OVERRIDE_HEADER;
use crate::extractors::{ApiKey, Caller};
use crate::middlewares::RequestContext;
use crate::service::ServiceState;
use crate::statsd::{GatewayCounters, GatewayTimers};

/// Reasons a request is denied access.
#[derive(Debug, thiserror::Error)]
pub enum AuthRejection {
    /// The `Authorization` header could not be decoded.
    #[error("Invalid Authentication header.")]
    InvalidHeader,
    /// No API key was presented.
    #[error("Unauthorized")]
    MissingKey,
    /// The auth backend rejected the API key.
    #[error(transparent)]
    Credentials(AuthError),
    /// The auth backend failed.
    #[error(transparent)]
    Backend(AuthError),
    /// The caller is authenticated but lacks admin privileges.
    #[error("Permission denied")]
    PermissionDenied,
}

impl AuthRejection {
    fn reason(&self) -> Option<&'static str> {
        match self {
            Self::InvalidHeader => Some("header"),
            Self::MissingKey => Some("missing"),
            Self::Credentials(_) => Some("credentials"),
            Self::Backend(_) => Some("backend"),
            Self::PermissionDenied => None,
        }
    }
}

impl From<AuthError> for AuthRejection {
    fn from(error: AuthError) -> Self {
        if error.is_credential_error() {
            Self::Credentials(error)
        } else {
            Self::Backend(error)
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        if let Some(reason) = self.reason() {
            metric!(counter(GatewayCounters::AuthFailed) += 1, reason = reason);
        }

        let status = match &self {
            Self::InvalidHeader | Self::MissingKey | Self::Credentials(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::Backend(error) => {
                tsgw_log::error!(
                    error = error as &dyn std::error::Error,
                    "failed to perform authentication"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, axum::Json(self.to_string())).into_response()
    }
}

/// Returns the organization an admin asked to act on behalf of.
fn org_override(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(ORG_OVERRIDE_HEADER)?
        .to_str()
        .ok()?
        .parse()
        .ok()
        .filter(|&org_id| org_id != 0)
}

/// Resolves the API key of the request into the caller's identity.
///
/// Admins may act on behalf of another organization by sending its id in the `X-Tsdb-Org`
/// header. The header is ignored for all other callers.
pub async fn authenticate(
    State(state): State<ServiceState>,
    api_key: ApiKey,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    if api_key.is_empty() {
        return Err(AuthRejection::MissingKey);
    }

    let start = Instant::now();
    let result = state.auth().authenticate(&api_key.0).await;
    metric!(timer(GatewayTimers::AuthDuration) = start.elapsed());

    let mut identity = result?;
    if let Some(org_id) = org_override(request.headers()) {
        identity = identity.impersonate(org_id);
    }

    request
        .extensions_mut()
        .insert(RequestContext::authenticated(identity));

    Ok(next.run(request).await)
}

/// Denies access to callers without admin privileges.
///
/// Must run after [`authenticate`].
pub async fn require_admin(
    Caller(identity): Caller,
    request: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    if !identity.is_admin {
        return Err(AuthRejection::PermissionDenied);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use tsgw_statsd::with_capturing_test_client;

    use super::*;

    #[test]
    fn test_org_override() {
        let cases = [
            (Some("12"), Some(12)),
            (Some("-1"), Some(-1)),
            (Some("0"), None),
            (Some("abc"), None),
            (Some(""), None),
            (None, None),
        ];

        for (value, expected) in cases {
            let mut headers = HeaderMap::new();
            if let Some(value) = value {
                headers.insert(ORG_OVERRIDE_HEADER, HeaderValue::from_static(value));
            }
            assert_eq!(org_override(&headers), expected, "{value:?}");
        }
    }

    #[test]
    fn test_rejection_status() {
        let cases = [
            (AuthRejection::InvalidHeader, StatusCode::UNAUTHORIZED),
            (AuthRejection::MissingKey, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidKey.into(), StatusCode::UNAUTHORIZED),
            (AuthError::InvalidOrgId.into(), StatusCode::UNAUTHORIZED),
            (
                AuthError::Backend("down".to_owned()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AuthRejection::PermissionDenied, StatusCode::FORBIDDEN),
        ];

        for (rejection, status) in cases {
            let message = rejection.to_string();
            assert_eq!(rejection.into_response().status(), status, "{message}");
        }
    }

    #[test]
    fn test_rejection_metric() {
        let captures = with_capturing_test_client(|| {
            AuthRejection::from(AuthError::InvalidKey).into_response();
            AuthRejection::PermissionDenied.into_response();
        });
        assert_eq!(captures, ["auth.failed:1|c|#reason:credentials"]);
    }
}
