//! Per-route request pipeline.
//!
//! Every API request passes through the same stages, stopping at the first
//! failure:
//!
//! 1. authenticate, when the route requires a caller (401)
//! 2. authorize, when the route requires a role (403, or 401 without a profile)
//! 3. rate limit the client address against the route's budget (429)
//! 4. run the handler with the resolved identity
//!
//! Handler errors become their own responses; panics and unexpected failures
//! become a bare 500. Admitted responses carry `X-RateLimit-*` headers.
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_core::middleware::pipeline::{PipelineLayer, RouteGuard};
//!
//! let app = Router::new().route(
//!     "/api/courses",
//!     post(create_course.layer(PipelineLayer::new(pipeline, RouteGuard::role("author", 5)))),
//! );
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{future::BoxFuture, FutureExt};
use metrics::counter;
use std::{
    any::Any,
    convert::Infallible,
    future::Future,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::Arc,
    task::{Context, Poll},
};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::error;

// Handler panics are turned into responses, which needs unwinding.
#[cfg(panic = "abort")]
compile_error!("lumen-core requires panic = \"unwind\"");

use super::auth::{AuthError, AuthGuard, Credential, Identity};
use super::rate_limit::{extract_client_id, PolicyKind, RateLimitDecision, RateLimitError, RateLimitService};
use crate::error::LumenError;

// ═══════════════════════════════════════════════════════════════════════════════
// Route Requirements
// ═══════════════════════════════════════════════════════════════════════════════

/// What a route demands of its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteGuard {
    pub requires_auth: bool,
    pub required_role: Option<&'static str>,
    /// Requests per window per client address
    pub budget: u64,
    pub policy: PolicyKind,
}

impl RouteGuard {
    /// Anyone may call the route.
    pub const fn public(budget: u64) -> Self {
        Self {
            requires_auth: false,
            required_role: None,
            budget,
            policy: PolicyKind::Default,
        }
    }

    /// The caller must be signed in.
    pub const fn authenticated(budget: u64) -> Self {
        Self {
            requires_auth: true,
            required_role: None,
            budget,
            policy: PolicyKind::Default,
        }
    }

    /// The caller must be signed in and hold `role`.
    pub const fn role(role: &'static str, budget: u64) -> Self {
        Self {
            requires_auth: true,
            required_role: Some(role),
            budget,
            policy: PolicyKind::Default,
        }
    }

    pub const fn with_policy(mut self, policy: PolicyKind) -> Self {
        self.policy = policy;
        self
    }
}

/// The parts of a request the pipeline inspects.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestMeta {
    pub fn new(headers: HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        Self { headers, remote_addr }
    }

    pub fn from_request(request: &Request<Body>) -> Self {
        Self {
            headers: request.headers().clone(),
            remote_addr: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Rejection raised before the handler runs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(e) => e.into_response(),
            Self::RateLimited(e) => e.into_response(),
        }
    }
}

/// Outcome of the pre-handler stages.
#[derive(Debug, Clone)]
pub struct Admission {
    pub identity: Option<Identity>,
    pub decision: RateLimitDecision,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pipeline
// ═══════════════════════════════════════════════════════════════════════════════

/// Composes the auth guard and the rate limiter in front of handlers.
#[derive(Debug, Clone)]
pub struct Pipeline {
    guard: AuthGuard,
    limiter: Arc<RateLimitService>,
}

impl Pipeline {
    pub fn new(guard: AuthGuard, limiter: Arc<RateLimitService>) -> Self {
        Self { guard, limiter }
    }

    pub fn limiter(&self) -> &RateLimitService {
        &self.limiter
    }

    /// Run the auth and rate limit stages.
    pub async fn admit(&self, route: &RouteGuard, meta: &RequestMeta) -> Result<Admission, PipelineError> {
        let identity = if route.requires_auth || route.required_role.is_some() {
            let credential = Credential::from_headers(&meta.headers);
            let identity = self.guard.authenticate(credential.as_ref()).await?;
            Some(match route.required_role {
                Some(role) => self.guard.authorize(identity, role).await?,
                None => identity,
            })
        } else {
            None
        };

        let client_id = extract_client_id(
            &meta.headers,
            meta.remote_addr,
            &self.limiter.config().trusted_proxy_headers,
        );
        let decision = self.limiter.limit(route.policy, &client_id, route.budget);
        if !decision.allowed {
            return Err(RateLimitError::from(decision).into());
        }

        Ok(Admission { identity, decision })
    }

    /// Run every stage and the handler, always producing a response.
    pub async fn run<F, Fut, E>(&self, route: &RouteGuard, meta: &RequestMeta, handler: F) -> Response
    where
        F: FnOnce(Option<Identity>) -> Fut,
        Fut: Future<Output = Result<Response, E>>,
        E: Into<LumenError>,
    {
        let admission = match self.admit(route, meta).await {
            Ok(admission) => admission,
            Err(rejection) => return rejection.into_response(),
        };

        let identity = admission.identity;
        let outcome = AssertUnwindSafe(async move { handler(identity).await })
            .catch_unwind()
            .await;

        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let e: LumenError = e.into();
                if e.http_status().is_server_error() {
                    counter!("pipeline_handler_failures_total").increment(1);
                }
                e.into_response()
            }
            Err(panic) => {
                counter!("pipeline_handler_failures_total").increment(1);
                LumenError::internal(format!("handler panicked: {}", panic_message(panic.as_ref())))
                    .into_response()
            }
        };

        admission.decision.apply_headers(response.headers_mut());
        response
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer and Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Applies the pipeline to one route.
#[derive(Clone)]
pub struct PipelineLayer {
    pipeline: Arc<Pipeline>,
    route: RouteGuard,
}

impl PipelineLayer {
    pub fn new(pipeline: Arc<Pipeline>, route: RouteGuard) -> Self {
        Self { pipeline, route }
    }
}

impl<S> Layer<S> for PipelineLayer {
    type Service = PipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            inner,
            pipeline: self.pipeline.clone(),
            route: self.route,
        }
    }
}

/// Pipeline service wrapping a route handler.
#[derive(Clone)]
pub struct PipelineService<S> {
    inner: S,
    pipeline: Arc<Pipeline>,
    route: RouteGuard,
}

impl<S> Service<Request<Body>> for PipelineService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let pipeline = self.pipeline.clone();
        let route = self.route;
        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let meta = RequestMeta::from_request(&request);
            let response = pipeline
                .run(&route, &meta, |identity| async move {
                    if let Some(identity) = identity {
                        request.extensions_mut().insert(identity);
                    }
                    inner.call(request).await
                })
                .await;

            Ok(response)
        })
    }
}
