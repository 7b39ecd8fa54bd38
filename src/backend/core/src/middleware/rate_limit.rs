//! Fixed-window rate limiting.
//!
//! Features:
//! - Per-client counters keyed by network address
//! - Three named policies (`default`, `auth`, `upload`), each with its own
//!   window and its own counter cache
//! - Per-route request budgets supplied at call time
//! - Standard X-RateLimit headers
//!
//! The limiter is advisory. `limit` reads the current count and writes the
//! incremented count as two separate cache operations, so two requests for
//! the same identifier racing at the boundary can both be admitted.
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_core::middleware::rate_limit::{RateLimitService, RateLimitConfig, PolicyKind};
//!
//! let limiter = RateLimitService::new(RateLimitConfig::default());
//! let decision = limiter.limit(PolicyKind::Default, "1.2.3.4", 10);
//! assert!(decision.allowed);
//! ```

use axum::{
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{Clock, CounterCache, CounterCacheStats, SystemClock};
use crate::error::LumenError;

/// Identifier used when no client address can be determined.
pub const FALLBACK_CLIENT_ID: &str = "127.0.0.1";

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate limiting errors.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        limit: u64,
        remaining: u64,
        reset_at: DateTime<Utc>,
        retry_after_secs: u64,
    },
}

impl From<RateLimitDecision> for RateLimitError {
    fn from(decision: RateLimitDecision) -> Self {
        Self::RateLimitExceeded {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
            retry_after_secs: decision.retry_after_secs(),
        }
    }
}

/// Rendered through [`LumenError`] with the `X-RateLimit-*` and
/// `Retry-After` headers added.
impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        match &self {
            Self::RateLimitExceeded {
                limit,
                remaining,
                reset_at,
                retry_after_secs,
            } => {
                insert_rate_limit_headers(&mut headers, *limit, *remaining, *reset_at);
                headers.insert("Retry-After", HeaderValue::from(*retry_after_secs));
            }
        }

        (headers, LumenError::from(self)).into_response()
    }
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, limit: u64, remaining: u64, reset_at: DateTime<Utc>) {
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_at.timestamp()));
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policies
// ═══════════════════════════════════════════════════════════════════════════════

/// Named rate limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// General API traffic
    Default,
    /// Credential-sensitive endpoints
    Auth,
    /// Upload endpoints
    Upload,
}

impl PolicyKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Auth => "auth",
            Self::Upload => "upload",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Window and tracking capacity for one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitPolicy {
    /// How long a counter lives after its last increment
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Maximum number of distinct identifiers tracked
    pub capacity: usize,
}

impl RateLimitPolicy {
    pub const fn new(window: Duration, capacity: usize) -> Self {
        Self { window, capacity }
    }

    /// 1 minute window, 500 identifiers.
    pub const fn default_policy() -> Self {
        Self::new(Duration::from_secs(60), 500)
    }

    /// 15 minute window, 100 identifiers.
    pub const fn auth() -> Self {
        Self::new(Duration::from_secs(15 * 60), 100)
    }

    /// 1 minute window, 50 identifiers.
    pub const fn upload() -> Self {
        Self::new(Duration::from_secs(60), 50)
    }

    /// Apply the fields present in `patch` on top of this policy.
    pub fn merged(self, patch: PolicyPatch) -> Self {
        Self {
            window: patch.window.unwrap_or(self.window),
            capacity: patch.capacity.unwrap_or(self.capacity),
        }
    }
}

/// Partially specified policy, as read from configuration.
///
/// Absent fields keep the named policy's own defaults, so
/// `LUMEN__RATE_LIMIT__AUTH__CAPACITY=200` leaves the 15 minute window alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicyPatch {
    #[serde(with = "humantime_serde")]
    pub window: Option<Duration>,
    pub capacity: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RateLimitConfigPatch")]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Trusted proxy headers for client IP extraction, checked in order
    pub trusted_proxy_headers: Vec<String>,

    /// Policy for general API routes
    pub default: RateLimitPolicy,

    /// Policy for authentication routes
    pub auth: RateLimitPolicy,

    /// Policy for upload routes
    pub upload: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trusted_proxy_headers: vec!["X-Forwarded-For".to_string(), "X-Real-IP".to_string()],
            default: RateLimitPolicy::default_policy(),
            auth: RateLimitPolicy::auth(),
            upload: RateLimitPolicy::upload(),
        }
    }
}

/// Rate limiting configuration as written, before defaults are filled in.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RateLimitConfigPatch {
    enabled: Option<bool>,
    trusted_proxy_headers: Option<Vec<String>>,
    default: PolicyPatch,
    auth: PolicyPatch,
    upload: PolicyPatch,
}

impl From<RateLimitConfigPatch> for RateLimitConfig {
    fn from(patch: RateLimitConfigPatch) -> Self {
        let defaults = Self::default();
        Self {
            enabled: patch.enabled.unwrap_or(defaults.enabled),
            trusted_proxy_headers: patch
                .trusted_proxy_headers
                .unwrap_or(defaults.trusted_proxy_headers),
            default: defaults.default.merged(patch.default),
            auth: defaults.auth.merged(patch.auth),
            upload: defaults.upload.merged(patch.upload),
        }
    }
}

impl RateLimitConfig {
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    /// Get the policy configured for `kind`.
    pub fn policy(&self, kind: PolicyKind) -> RateLimitPolicy {
        match kind {
            PolicyKind::Default => self.default,
            PolicyKind::Auth => self.auth,
            PolicyKind::Upload => self.upload,
        }
    }
}

/// Builder for rate limit configuration.
#[derive(Debug, Default)]
pub struct RateLimitConfigBuilder {
    config: RateLimitConfig,
}

impl RateLimitConfigBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn policy(mut self, kind: PolicyKind, policy: RateLimitPolicy) -> Self {
        match kind {
            PolicyKind::Default => self.config.default = policy,
            PolicyKind::Auth => self.config.auth = policy,
            PolicyKind::Upload => self.config.upload = policy,
        }
        self
    }

    pub fn trusted_proxy_headers(mut self, headers: Vec<String>) -> Self {
        self.config.trusted_proxy_headers = headers;
        self
    }

    pub fn build(self) -> RateLimitConfig {
        self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Budget the request was checked against
    pub limit: u64,

    /// Requests left in the current window
    pub remaining: u64,

    /// Time until the identifier's counter expires, read from the limiter's clock
    #[serde(with = "humantime_serde")]
    pub reset_after: Duration,

    /// Wall-clock equivalent of `reset_after`, for the `X-RateLimit-Reset` header
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    fn new(allowed: bool, limit: u64, remaining: u64, reset_after: Duration) -> Self {
        Self {
            allowed,
            limit,
            remaining,
            reset_after,
            reset_at: Utc::now() + chrono::Duration::from_std(reset_after).unwrap_or_default(),
        }
    }

    /// Whole seconds a rejected client should wait before retrying, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs() + u64::from(self.reset_after.subsec_nanos() > 0);
        secs.max(1)
    }

    /// Add `X-RateLimit-*` headers describing this decision.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        insert_rate_limit_headers(headers, self.limit, self.remaining, self.reset_at);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-window limiter for a single policy.
#[derive(Debug)]
pub struct RateLimiter {
    kind: PolicyKind,
    counters: CounterCache,
}

impl RateLimiter {
    pub fn new(kind: PolicyKind, policy: RateLimitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            kind,
            counters: CounterCache::with_clock(policy.capacity, policy.window, clock),
        }
    }

    /// Count a request for `identifier` against a budget of `max` per window.
    pub fn limit(&self, identifier: &str, max: u64) -> RateLimitDecision {
        let count = self.counters.get(identifier).unwrap_or(0);

        let decision = if count >= max {
            // A rejection leaves the counter alone, so the reset is whenever
            // the existing entry runs out.
            let reset_after = self
                .counters
                .time_to_expiry(identifier)
                .unwrap_or_else(|| self.counters.window());
            RateLimitDecision::new(false, max, 0, reset_after)
        } else {
            self.counters.set(identifier, count + 1);
            RateLimitDecision::new(true, max, max - count - 1, self.counters.window())
        };

        counter!(
            "rate_limit_checks_total",
            "policy" => self.kind.as_str(),
            "allowed" => decision.allowed.to_string()
        )
        .increment(1);

        if decision.allowed {
            debug!(policy = %self.kind, identifier, remaining = decision.remaining, "Rate limit check passed");
        } else {
            warn!(policy = %self.kind, identifier, limit = max, "Rate limit exceeded");
        }

        decision
    }

    pub fn kind(&self) -> PolicyKind {
        self.kind
    }

    pub fn window(&self) -> Duration {
        self.counters.window()
    }

    pub fn stats(&self) -> CounterCacheStats {
        self.counters.stats()
    }
}

/// Process-wide rate limiting service owning one limiter per named policy.
///
/// Each policy has its own counter cache, so exhausting one policy's budget
/// for an identifier leaves the others untouched.
#[derive(Debug)]
pub struct RateLimitService {
    config: RateLimitConfig,
    default: RateLimiter,
    auth: RateLimiter,
    upload: RateLimiter,
}

impl RateLimitService {
    /// Create the service using the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create the service driven by the given clock.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            default: RateLimiter::new(PolicyKind::Default, config.default, clock.clone()),
            auth: RateLimiter::new(PolicyKind::Auth, config.auth, clock.clone()),
            upload: RateLimiter::new(PolicyKind::Upload, config.upload, clock),
            config,
        }
    }

    /// Get the limiter for a policy.
    pub fn limiter(&self, kind: PolicyKind) -> &RateLimiter {
        match kind {
            PolicyKind::Default => &self.default,
            PolicyKind::Auth => &self.auth,
            PolicyKind::Upload => &self.upload,
        }
    }

    /// Count a request under `kind`. Always allows when limiting is disabled.
    pub fn limit(&self, kind: PolicyKind, identifier: &str, max: u64) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::new(true, max, max, Duration::ZERO);
        }

        self.limiter(kind).limit(identifier, max)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Client ID Extraction
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolve the identifier used to bucket a request.
///
/// Trusted proxy headers win over the socket address; when neither yields an
/// address the fixed loopback placeholder is used, merging all such clients
/// into one bucket.
pub fn extract_client_id(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    trusted_proxy_headers: &[String],
) -> String {
    extract_client_ip(headers, remote_addr, trusted_proxy_headers)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| FALLBACK_CLIENT_ID.to_string())
}

fn extract_client_ip(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    trusted_proxy_headers: &[String],
) -> Option<IpAddr> {
    for header_name in trusted_proxy_headers {
        if let Some(value) = headers.get(header_name.as_str()) {
            if let Ok(s) = value.to_str() {
                // X-Forwarded-For can contain multiple IPs, take the first (client)
                let ip_str = s.split(',').next().unwrap_or(s).trim();
                if let Ok(ip) = ip_str.parse() {
                    return Some(ip);
                }
            }
        }
    }

    remote_addr.map(|addr| addr.ip())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MockClock;
    use axum::http::StatusCode;
    use std::time::Instant;

    fn service_with_clock() -> (RateLimitService, MockClock) {
        let clock = MockClock::new(Instant::now());
        let service = RateLimitService::with_clock(RateLimitConfig::default(), Arc::new(clock.clone()));
        (service, clock)
    }

    #[test]
    fn test_remaining_counts_down_then_denies() {
        let (service, _) = service_with_clock();

        let remaining: Vec<u64> = (0..5)
            .map(|_| {
                let decision = service.limit(PolicyKind::Default, "1.2.3.4", 5);
                assert!(decision.allowed);
                assert_eq!(decision.limit, 5);
                decision.remaining
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let denied = service.limit(PolicyKind::Default, "1.2.3.4", 5);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn test_denied_requests_do_not_rearm_window() {
        let (service, clock) = service_with_clock();

        for _ in 0..2 {
            assert!(service.limit(PolicyKind::Default, "a", 2).allowed);
        }

        clock.advance(Duration::from_secs(30));
        assert!(!service.limit(PolicyKind::Default, "a", 2).allowed);

        clock.advance(Duration::from_secs(30));
        let decision = service.limit(PolicyKind::Default, "a", 2);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_reset_at_is_one_window_ahead() {
        let (service, _) = service_with_clock();
        let before = Utc::now();
        let decision = service.limit(PolicyKind::Auth, "a", 3);
        let delta = decision.reset_at - before;
        assert!(delta >= chrono::Duration::minutes(15));
        assert!(delta < chrono::Duration::minutes(15) + chrono::Duration::seconds(5));
    }

    #[test]
    fn test_rejection_reports_time_left_on_the_clock() {
        let (service, clock) = service_with_clock();
        assert!(service.limit(PolicyKind::Default, "a", 1).allowed);

        clock.advance(Duration::from_secs(45));
        let denied = service.limit(PolicyKind::Default, "a", 1);
        assert!(!denied.allowed);
        assert_eq!(denied.reset_after, Duration::from_secs(15));
        assert_eq!(denied.retry_after_secs(), 15);

        let delta = denied.reset_at - Utc::now();
        assert!(delta <= chrono::Duration::seconds(15));
        assert!(delta > chrono::Duration::seconds(10));
    }

    #[test]
    fn test_partial_policy_keeps_its_own_defaults() {
        let config: RateLimitConfig = serde_json::from_value(serde_json::json!({
            "auth": {"capacity": 200},
            "upload": {"window": "5m"}
        }))
        .unwrap();

        assert_eq!(config.auth, RateLimitPolicy::new(Duration::from_secs(15 * 60), 200));
        assert_eq!(config.upload, RateLimitPolicy::new(Duration::from_secs(5 * 60), 50));
        assert_eq!(config.default, RateLimitPolicy::default_policy());
        assert_eq!(config.trusted_proxy_headers, RateLimitConfig::default().trusted_proxy_headers);
        assert!(config.enabled);
    }

    #[test]
    fn test_disabled_always_allows() {
        let service = RateLimitService::new(RateLimitConfig::builder().enabled(false).build());
        for _ in 0..10 {
            let decision = service.limit(PolicyKind::Default, "a", 1);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 1);
        }
    }

    #[test]
    fn test_zero_budget_denies_immediately() {
        let (service, _) = service_with_clock();
        let decision = service.limit(PolicyKind::Default, "a", 0);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_default_policies() {
        let config = RateLimitConfig::default();
        assert_eq!(config.policy(PolicyKind::Default), RateLimitPolicy::new(Duration::from_secs(60), 500));
        assert_eq!(config.policy(PolicyKind::Auth), RateLimitPolicy::new(Duration::from_secs(900), 100));
        assert_eq!(config.policy(PolicyKind::Upload), RateLimitPolicy::new(Duration::from_secs(60), 50));
    }

    #[test]
    fn test_config_builder() {
        let config = RateLimitConfig::builder()
            .policy(PolicyKind::Upload, RateLimitPolicy::new(Duration::from_secs(10), 5))
            .trusted_proxy_headers(vec![])
            .build();

        assert_eq!(config.upload.capacity, 5);
        assert!(config.trusted_proxy_headers.is_empty());
        assert!(config.enabled);
    }

    #[test]
    fn test_extract_client_id_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        let remote: SocketAddr = "10.0.0.2:4000".parse().unwrap();
        let trusted = RateLimitConfig::default().trusted_proxy_headers;

        assert_eq!(extract_client_id(&headers, Some(remote), &trusted), "203.0.113.7");
    }

    #[test]
    fn test_extract_client_id_uses_socket_address() {
        let remote: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        let trusted = RateLimitConfig::default().trusted_proxy_headers;
        assert_eq!(extract_client_id(&HeaderMap::new(), Some(remote), &trusted), "192.0.2.10");
    }

    #[test]
    fn test_extract_client_id_ignores_garbage_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Real-IP", HeaderValue::from_static("not-an-ip"));
        let trusted = RateLimitConfig::default().trusted_proxy_headers;
        assert_eq!(extract_client_id(&headers, None, &trusted), FALLBACK_CLIENT_ID);
    }

    #[test]
    fn test_untrusted_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(extract_client_id(&headers, None, &[]), FALLBACK_CLIENT_ID);
    }

    #[test]
    fn test_rate_limit_error_response() {
        let error = RateLimitError::RateLimitExceeded {
            limit: 5,
            remaining: 0,
            reset_at: Utc::now() + chrono::Duration::seconds(60),
            retry_after_secs: 60,
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["X-RateLimit-Limit"], "5");
        assert_eq!(response.headers()["Retry-After"], "60");
    }

    #[test]
    fn test_decision_retry_after_rounds_up() {
        let decision = RateLimitDecision::new(false, 5, 0, Duration::from_millis(1500));
        assert_eq!(decision.retry_after_secs(), 2);

        let decision = RateLimitDecision::new(false, 5, 0, Duration::ZERO);
        assert_eq!(decision.retry_after_secs(), 1);
    }
}
