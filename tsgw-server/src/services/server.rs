use std::future::Future;
use std::net::SocketAddr;

use axum::http::{HeaderValue, header};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tsgw_statsd::metric;

use crate::constants;
use crate::endpoints;
use crate::middlewares;
use crate::service::ServiceState;
use crate::statsd::GatewayCounters;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[source] std::io::Error),

    /// The server stopped with an I/O error.
    #[error("server failed")]
    ServeFailed(#[source] std::io::Error),
}

/// Build the axum application with all routes and middleware.
pub fn make_app(service: ServiceState) -> axum::Router {
    // Build the router middleware into a single service which runs _after_ routing. Service
    // builder order defines layers added first will be called first. This means:
    //  - Requests go from top to bottom
    //  - Responses go from bottom to top
    let middleware = ServiceBuilder::new()
        .layer(axum::middleware::from_fn(middlewares::trace))
        .layer(axum::middleware::from_fn_with_state(
            service.clone(),
            middlewares::request_stats,
        ))
        .layer(CatchPanicLayer::custom(middlewares::handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            header::SERVER,
            HeaderValue::from_static(constants::SERVER),
        ))
        .layer(axum::middleware::from_fn(middlewares::request_context));

    endpoints::routes(&service)
        .layer(middleware)
        .with_state(service)
}

/// HTTP server.
///
/// This is the main HTTP server of the gateway which hosts all endpoints and dispatches incoming
/// traffic to them.
pub struct HttpServer {
    listener: TcpListener,
    app: axum::Router,
}

impl HttpServer {
    /// Binds the listen address configured in the service state.
    pub async fn bind(service: ServiceState) -> Result<Self, ServerError> {
        let addr = service.config().listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(ServerError::BindFailed)?;

        Ok(Self {
            listener,
            app: make_app(service),
        })
    }

    /// Returns the address the server is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::BindFailed)
    }

    /// Serves requests until `shutdown` resolves, then drains open connections.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            tsgw_log::info!("spawning http server");
            tsgw_log::info!("  listening on http://{addr}/");
        }
        metric!(counter(GatewayCounters::ServerStarting) += 1);

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::ServeFailed)
    }
}

/// Resolves once the process receives `SIGINT` or `SIGTERM`.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tsgw_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to listen for ctrl-c"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tsgw_log::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to listen for SIGTERM"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tsgw_log::info!("shutting down HTTP server");
}
