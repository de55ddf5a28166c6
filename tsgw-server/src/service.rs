use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use tsgw_auth::{AuthBackend, Identity, StaticKeyAuth};
use tsgw_config::Config;
use tsgw_schema::{MetricSchema, StandardSchema};

use crate::services::{
    DiscardPublisher, ElasticsearchProxy, Publisher, SearchProxy, UnavailableSearchProxy,
    UpstreamPublisher,
};
use crate::stats::RequestStats;

/// Identity granted to the configured admin key.
const ADMIN_IDENTITY: Identity = Identity::new(1, true);

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Initializing the publisher client failed.
    #[error("could not initialize publisher")]
    Publisher,

    /// Initializing the search client failed.
    #[error("could not initialize search proxy")]
    Search,

    /// Creating the request stats registry failed.
    #[error("could not initialize request stats")]
    Stats(#[from] prometheus::Error),
}

struct StateInner {
    config: Arc<Config>,
    auth: Arc<dyn AuthBackend>,
    schema: Arc<dyn MetricSchema>,
    publisher: Arc<dyn Publisher>,
    search: Arc<dyn SearchProxy>,
    stats: RequestStats,
}

/// Server state shared by all requests.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Creates all capabilities from the configuration.
    pub fn start(config: Arc<Config>) -> anyhow::Result<Self> {
        let auth = StaticKeyAuth::new(
            config
                .api_keys()
                .iter()
                .map(|key| (key.key.clone(), Identity::new(key.org_id, key.admin)))
                .chain(
                    config
                        .admin_key()
                        .map(|key| (key.to_owned(), ADMIN_IDENTITY)),
                ),
        );
        if auth.is_empty() {
            tsgw_log::warn!("no api keys configured, all authenticated requests will be rejected");
        }

        let publisher: Arc<dyn Publisher> = match config.publish_url() {
            Some(url) => Arc::new(
                UpstreamPublisher::new(url.clone(), config.http_timeout())
                    .context(ServiceError::Publisher)?,
            ),
            None => {
                tsgw_log::info!("no publish url configured, discarding accepted metrics");
                Arc::new(DiscardPublisher)
            }
        };

        let search: Arc<dyn SearchProxy> = match config.search_url() {
            Some(url) => Arc::new(
                ElasticsearchProxy::new(
                    url.clone(),
                    config.http_timeout(),
                    config.max_payload_size(),
                )
                .context(ServiceError::Search)?,
            ),
            None => Arc::new(UnavailableSearchProxy),
        };

        let state = Self::new(
            config,
            Arc::new(auth),
            Arc::new(StandardSchema),
            publisher,
            search,
        )?;

        Ok(state)
    }

    /// Creates state from explicit capabilities.
    pub fn new(
        config: Arc<Config>,
        auth: Arc<dyn AuthBackend>,
        schema: Arc<dyn MetricSchema>,
        publisher: Arc<dyn Publisher>,
        search: Arc<dyn SearchProxy>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            inner: Arc::new(StateInner {
                config,
                auth,
                schema,
                publisher,
                search,
                stats: RequestStats::new()?,
            }),
        })
    }

    /// Returns an atomically counted reference to the config.
    pub fn config(&self) -> &Arc<Config> {
        &self.inner.config
    }

    /// Returns the backend resolving API keys.
    pub fn auth(&self) -> &dyn AuthBackend {
        self.inner.auth.as_ref()
    }

    /// Returns the validation and identity rules for ingested metrics.
    pub fn schema(&self) -> &dyn MetricSchema {
        self.inner.schema.as_ref()
    }

    /// Returns the downstream publisher.
    pub fn publisher(&self) -> &dyn Publisher {
        self.inner.publisher.as_ref()
    }

    /// Returns the search cluster proxy.
    pub fn search(&self) -> &dyn SearchProxy {
        self.inner.search.as_ref()
    }

    /// Returns the per-path request statistics.
    pub fn stats(&self) -> &RequestStats {
        &self.inner.stats
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("listen_addr", &self.config().listen_addr())
            .field("stats", &self.inner.stats)
            .finish_non_exhaustive()
    }
}
