#![allow(clippy::result_large_err)]
//! # Lumen Core
//!
//! API core of the Lumen course platform.
//!
//! ## Architecture
//!
//! - **Cache**: Fixed-window counters with per-entry expiry and LRU eviction
//! - **Middleware**: Named rate limit policies, the authentication guard and
//!   the per-route request pipeline that composes them in front of handlers
//! - **DB**: Data store and identity provider traits with in-memory and
//!   hosted REST backends
//! - **Domain**: Request payloads, quiz grading and course progress
//! - **Validation**: Field-level request validation
//! - **API**: Axum router and handlers
//! - **Telemetry**: Structured logging and Prometheus metrics

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod middleware;
pub mod telemetry;
pub mod validation;

pub use error::{ErrorCode, ErrorDetails, ErrorSeverity, LumenError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{build_router, ApiResponse, AppState};
    pub use crate::cache::{Clock, CounterCache, SystemClock};
    pub use crate::config::{BackendKind, Config};
    pub use crate::db::{DataStore, DbError, Filter, IdentityProvider, MemoryStore, Page, RestStore, Row};
    pub use crate::error::{ErrorCode, ErrorDetails, ErrorSeverity, LumenError, Result};
    pub use crate::middleware::{
        AuthError, AuthGuard, Credential, Identity, Pipeline, PipelineLayer, PolicyKind,
        RateLimitConfig, RateLimitDecision, RateLimitPolicy, RateLimitService, RouteGuard,
    };
    pub use crate::validation::{Validate, ValidationErrors, ValidationResult};
}
