//! Request middleware for Lumen Core.
pub mod auth;
pub mod pipeline;
pub mod rate_limit;

pub use auth::{AuthError, AuthGuard, Credential, Identity, MaybeIdentity};
pub use pipeline::{Admission, Pipeline, PipelineError, PipelineLayer, RequestMeta, RouteGuard};
pub use rate_limit::{
    PolicyKind, RateLimitConfig, RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimitService,
    RateLimiter,
};
