use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tsgw_auth::{AuthBackend, Identity, StaticKeyAuth};
use tsgw_config::Config;
use tsgw_schema::{MetricData, MetricSchema, StandardSchema, ValidationError};

use crate::service::ServiceState;
use crate::services::{ProxyError, PublishError, Publisher, SearchProxy, make_app};

/// Reads the full body of a response into a string.
pub async fn response_body(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The keys known to the default test auth backend.
///
/// - `user`: organization `10`
/// - `admin`: organization `1`, admin
/// - `orphan`: no organization
pub fn test_auth() -> StaticKeyAuth {
    StaticKeyAuth::new([
        ("user".to_owned(), Identity::new(10, false)),
        ("admin".to_owned(), Identity::new(1, true)),
        ("orphan".to_owned(), Identity::new(0, false)),
    ])
}

/// Builder for a [`ServiceState`] with test doubles.
pub struct TestState {
    config: serde_json::Value,
    auth: Arc<dyn AuthBackend>,
    schema: Arc<dyn MetricSchema>,
    publisher: Arc<dyn Publisher>,
    search: Arc<dyn SearchProxy>,
}

impl TestState {
    pub fn new() -> Self {
        Self::with_config(serde_json::json!({}))
    }

    pub fn with_config(config: serde_json::Value) -> Self {
        Self {
            config,
            auth: Arc::new(test_auth()),
            schema: Arc::new(StandardSchema),
            publisher: Arc::new(RecordingPublisher::default()),
            search: Arc::new(MockSearchProxy::default()),
        }
    }

    pub fn schema(mut self, schema: impl MetricSchema + 'static) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn search(mut self, search: Arc<dyn SearchProxy>) -> Self {
        self.search = search;
        self
    }

    pub fn build(self) -> ServiceState {
        let config = Config::from_json_value(self.config).unwrap();
        ServiceState::new(
            Arc::new(config),
            self.auth,
            self.schema,
            self.publisher,
            self.search,
        )
        .unwrap()
    }

    /// Builds the full application including all middlewares.
    pub fn app(self) -> axum::Router {
        make_app(self.build())
    }
}

/// Accepts every record and identifies series by organization and name.
#[derive(Debug, Default)]
pub struct PermissiveSchema;

impl MetricSchema for PermissiveSchema {
    fn validate(&self, _metric: &MetricData) -> Result<(), ValidationError> {
        Ok(())
    }

    fn compute_id(&self, metric: &MetricData) -> String {
        format!("{}.{}", metric.org_id, metric.metric)
    }
}

/// Keeps all published batches.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    batches: Mutex<Vec<Vec<MetricData>>>,
}

impl RecordingPublisher {
    pub fn batches(&self) -> Vec<Vec<MetricData>> {
        self.batches.lock().clone()
    }
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, metrics: Vec<MetricData>) -> Result<(), PublishError> {
        self.batches.lock().push(metrics);
        Ok(())
    }
}

/// Fails every batch.
#[derive(Debug, Default)]
pub struct FailingPublisher;

#[async_trait::async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, _metrics: Vec<MetricData>) -> Result<(), PublishError> {
        Err(PublishError::Status(StatusCode::BAD_GATEWAY))
    }
}

/// Answers every search with a fixed response and records the organizations it was run for.
#[derive(Debug, Default)]
pub struct MockSearchProxy {
    org_ids: Mutex<Vec<i64>>,
}

impl MockSearchProxy {
    pub const RESPONSE: &'static str = r#"{"responses":[]}"#;

    pub fn org_ids(&self) -> Vec<i64> {
        self.org_ids.lock().clone()
    }
}

#[async_trait::async_trait]
impl SearchProxy for MockSearchProxy {
    async fn proxy(&self, org_id: i64, _request: Request) -> Result<Response, ProxyError> {
        self.org_ids.lock().push(org_id);
        Ok(Self::RESPONSE.into_response())
    }
}
