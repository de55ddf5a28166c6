use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use data_encoding::BASE64;

use crate::middlewares::AuthRejection;

/// The user name under which basic authentication transports an API key.
const BASIC_AUTH_USER: &str = "api_key";

/// The API key presented in the `Authorization` header.
///
/// Keys are accepted as `Bearer <key>` or as basic authentication with the user `api_key` and the
/// key as password. All other forms yield an empty key. A basic authentication payload that is
/// not valid base64 is rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApiKey(pub String);

impl ApiKey {
    /// Parses the value of an `Authorization` header.
    pub fn parse(header: &str) -> Result<Self, AuthRejection> {
        let Some((scheme, credentials)) = header.split_once(' ') else {
            return Ok(Self::default());
        };

        match scheme {
            "Bearer" => Ok(Self(credentials.to_owned())),
            "Basic" => {
                let decoded = BASE64.decode(credentials.as_bytes()).map_err(|error| {
                    tsgw_log::warn!("unable to decode basic auth header: {error}");
                    AuthRejection::InvalidHeader
                })?;
                let decoded = String::from_utf8_lossy(&decoded);

                match decoded.split_once(':') {
                    Some((BASIC_AUTH_USER, password)) => Ok(Self(password.to_owned())),
                    _ => Ok(Self::default()),
                }
            }
            _ => Ok(Self::default()),
        }
    }

    /// Returns `true` if no key was presented.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        match parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        {
            Some(value) => Self::parse(value),
            None => Ok(Self::default()),
        }
    }
}
