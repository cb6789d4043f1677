//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, timeout)
//! - Bind server to listener
//! - Dispatch generation requests to the gateway
//! - Apply config reloads and stop on the shutdown broadcast

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{AdminConfig, GatewayConfig};
use crate::gateway::{Gateway, GatewayRequest};
use crate::http::request::{self, MakeRequestUuidV4};
use crate::http::response;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub admin: Arc<AdminConfig>,
    pub started_at: Instant,
    /// Bound on a whole request; generation answers with a Timeout envelope past it.
    pub request_timeout: Duration,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server around an assembled gateway.
    pub fn new(config: &GatewayConfig, gateway: Gateway) -> Self {
        let state = AppState {
            gateway,
            admin: Arc::new(config.admin.clone()),
            started_at: Instant::now(),
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };
        let router = Self::build_router(config, state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/v1/generate", post(generate_handler))
            .with_state(state.clone());

        if config.admin.enabled {
            #[allow(deprecated)]
            let admin_timeout = TimeoutLayer::new(state.request_timeout);
            router = router.merge(admin::setup_admin_router(state).layer(admin_timeout));
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
                .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        path = %req.uri().path(),
                        request_id = %request::request_id(req.headers()),
                    )
                }))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes)),
        )
    }

    /// Run the server until `shutdown_rx` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let gateway = self.state.gateway.clone();
        let mut reload_shutdown = shutdown_rx.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => gateway.apply_config(&config),
                        None => break,
                    },
                    _ = reload_shutdown.recv() => break,
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /v1/generate`.
///
/// The gateway runs on its own task: a client that disconnects does not cancel
/// the provider call, and the result is still cached. The same holds when the
/// request deadline passes first; the caller gets a Timeout envelope.
async fn generate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GatewayRequest>,
) -> Response {
    let request_id = request::request_id(&headers).to_string();
    tracing::debug!(
        request_id = %request_id,
        provider = %body.provider,
        format = %body.expected_format,
        "Generation request"
    );

    let gateway = state.gateway.clone();
    let task = tokio::spawn(async move { gateway.execute(body).await });

    let joined = match tokio::time::timeout(state.request_timeout, task).await {
        Ok(joined) => joined,
        Err(_) => {
            tracing::warn!(
                request_id = %request_id,
                limit_ms = state.request_timeout.as_millis() as u64,
                "Generation request exceeded its deadline"
            );
            return response::request_timeout(state.request_timeout);
        }
    };

    match joined {
        Ok(result) => {
            if let Err(e) = &result {
                tracing::warn!(request_id = %request_id, error = %e, "Generation request failed");
            }
            response::into_http(result)
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Gateway task aborted");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
