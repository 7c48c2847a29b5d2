//! HTTP ingress: owns the listener, the shared middleware stack and the
//! service-level routes (`/health`, `/openapi.json`, `/docs`). Modules hand
//! in their routers and OpenAPI fragments; the ingress serves the result
//! until cancelled.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{middleware::from_fn, routing::get, Extension, Router};
use runtime::{ConfigProvider, ConfigProviderExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
};

mod config;
pub mod error;
pub mod request_id;
mod web;

pub use config::ApiIngressConfig;

pub const MODULE_NAME: &str = "api_ingress";

pub struct ApiIngress {
    config: ApiIngressConfig,
}

impl ApiIngress {
    pub fn new(config: ApiIngressConfig) -> Self {
        Self { config }
    }

    /// Load `modules.api_ingress`; a missing section yields defaults.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Result<Self> {
        let config: ApiIngressConfig = provider.module_config(MODULE_NAME)?;
        tracing::debug!(
            enable_docs = config.enable_docs,
            cors_enabled = config.cors_enabled,
            "Loaded api_ingress config"
        );
        Ok(Self::new(config))
    }

    /// Replace the per-request timeout (`server.timeout_sec` when set).
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn config(&self) -> &ApiIngressConfig {
        &self.config
    }

    /// Wrap the module routes with the service routes and middleware.
    ///
    /// Layer order, outermost first: SetRequestId, PropagateRequestId,
    /// request id extension, Trace, Timeout, CORS, BodyLimit.
    pub fn build_router(&self, api: Router, openapi: utoipa::openapi::OpenApi) -> Router {
        let mut router = api
            .route("/health", get(web::health_check))
            .route("/openapi.json", get(web::openapi_json));
        if self.config.enable_docs {
            router = router.route("/docs", get(web::serve_docs));
        }
        router = router
            .fallback(error::route_not_found)
            .layer(Extension(web::ApiDocument(Arc::new(openapi))))
            .layer(RequestBodyLimitLayer::new(self.config.body_limit_bytes));

        if self.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }

        let x_request_id = request_id::request_id_header();
        router
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(request_id::trace_layer())
            .layer(from_fn(request_id::attach_correlation_id))
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(SetRequestIdLayer::new(x_request_id, request_id::NanoRequestId))
    }

    /// Address to bind: the module override, else `fallback`.
    pub fn resolve_bind_addr(&self, fallback: &str) -> Result<SocketAddr> {
        let raw = self.config.bind_addr.as_deref().unwrap_or(fallback);
        raw.parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", raw, e))
    }

    /// Bind and serve until `cancel` fires.
    pub async fn serve(&self, addr: SocketAddr, router: Router, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("HTTP server bound on {}", listener.local_addr()?);
        serve_listener(listener, router, cancel).await
    }
}

/// Serve on an already bound listener with graceful shutdown.
pub async fn serve_listener(listener: TcpListener, router: Router, cancel: CancellationToken) -> Result<()> {
    let shutdown = async move {
        cancel.cancelled().await;
        tracing::info!("HTTP server shutting down gracefully (cancellation)");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
}
