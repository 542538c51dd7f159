//! HTTP server
//!
//! The operator surface: registry inspection, DDL, reshard control, and
//! the query endpoints, served by axum over one shared controller.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use super::config::HttpServerConfig;
use super::routes::routes;
use crate::control::Controller;
use crate::observability::{Event, Logger};

/// HTTP server for the keyspan operator API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Create a server over a booted controller.
    pub fn new(config: HttpServerConfig, controller: Arc<Controller>) -> Self {
        let router = Self::build_router(&config, controller);
        Self { config, router }
    }

    fn build_router(config: &HttpServerConfig, controller: Arc<Controller>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            use tower_http::cors::AllowOrigin;
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        routes(controller).layer(cors)
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Start serving (async).
    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self.config.socket_addr().parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid socket address '{}': {}", self.config.socket_addr(), e),
            )
        })?;

        let listener = TcpListener::bind(addr).await?;
        Logger::info(
            Event::Serving.as_str(),
            &[("addr", &addr.to_string())],
        );
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}
