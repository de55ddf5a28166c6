use std::convert::Infallible;
use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::constants::{CONTENT_TYPE_BINARY, CONTENT_TYPE_BINARY_SNAPPY};

/// The verbatim `Content-Type` header of a request, or an empty string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawContentType(String);

impl RawContentType {
    /// Returns the media type without parameters.
    pub fn essence(&self) -> &str {
        self.0.split(';').next().unwrap_or_default().trim()
    }
}

impl fmt::Display for RawContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for RawContentType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for RawContentType
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_owned();

        Ok(Self(content_type))
    }
}

/// Encodings accepted by the ingestion endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestFormat {
    /// A JSON array of records.
    Json,
    /// A binary message envelope.
    Binary,
    /// A binary message envelope in a snappy frame stream.
    BinarySnappy,
}

impl IngestFormat {
    /// Returns the format for a content type, ignoring its parameters.
    pub fn from_content_type(content_type: &RawContentType) -> Option<Self> {
        match content_type.essence() {
            "application/json" => Some(Self::Json),
            CONTENT_TYPE_BINARY => Some(Self::Binary),
            CONTENT_TYPE_BINARY_SNAPPY => Some(Self::BinarySnappy),
            _ => None,
        }
    }
}
