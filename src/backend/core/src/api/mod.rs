//! HTTP API for the course platform.
//!
//! Every `/api` route is wrapped in a [`PipelineLayer`](crate::middleware::PipelineLayer)
//! carrying that route's [`RouteGuard`](crate::middleware::RouteGuard); see
//! [`routes`] for the table. Successful responses use the [`ApiResponse`]
//! envelope, failures the [`ErrorResponse`](crate::error::ErrorResponse) one.

pub mod extract;
pub mod handlers;
pub mod routes;

use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::db::{DataStore, IdentityProvider};
use crate::middleware::auth::AuthGuard;
use crate::middleware::pipeline::Pipeline;
use crate::middleware::rate_limit::RateLimitService;
use crate::telemetry::MetricsRegistry;

pub use routes::api_router;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub pipeline: Arc<Pipeline>,
    pub metrics: MetricsRegistry,
}

impl AppState {
    /// Wire the pipeline from a store, an identity provider and a limiter.
    pub fn new(
        store: Arc<dyn DataStore>,
        identity: Arc<dyn IdentityProvider>,
        limiter: Arc<RateLimitService>,
        metrics: MetricsRegistry,
    ) -> Self {
        let guard = AuthGuard::new(identity.clone(), store.clone());
        Self {
            store,
            identity,
            pipeline: Arc::new(Pipeline::new(guard, limiter)),
            metrics,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pipeline", &self.pipeline)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Build the application router.
///
/// ```rust,ignore
/// let state = AppState::new(store.clone(), store, limiter, metrics);
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api_router(state.pipeline.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Success envelope for API responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}
