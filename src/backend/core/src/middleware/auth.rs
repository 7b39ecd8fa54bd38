//! Authentication and authorization.
//!
//! Features:
//! - Opaque bearer credentials read from the `Authorization` header or the
//!   backend's session cookie
//! - Identity resolution through an injected [`IdentityProvider`]
//! - Exact-match role checks against the caller's stored profile
//! - Request extractors for the resolved identity
//!
//! # Example
//!
//! ```rust,ignore
//! use lumen_core::middleware::auth::{AuthGuard, Credential};
//!
//! let guard = AuthGuard::new(provider, store);
//! let identity = guard.authenticate(Some(&Credential::new(token))).await?;
//! let author = guard.authorize(identity, "author").await?;
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::debug;

use crate::db::{DataStore, DbError, Filter, IdentityProvider, Row};
use crate::error::LumenError;

/// Default role assigned at sign-up.
pub const ROLE_STUDENT: &str = "student";

/// Role allowed to create courses.
pub const ROLE_AUTHOR: &str = "author";

/// Cookie carrying the access token for browser sessions.
pub const SESSION_COOKIE: &str = "sb-access-token";

const PROFILES_TABLE: &str = "profiles";

// ═══════════════════════════════════════════════════════════════════════════════
// Error Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication credentials")]
    MissingCredentials,

    #[error("Invalid or expired credential")]
    InvalidCredential,

    #[error("Caller has no profile")]
    ProfileNotFound,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Identity provider error: {0}")]
    Provider(#[from] DbError),
}

impl AuthError {
    /// Stable label used in responses and metrics.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "MISSING_CREDENTIALS",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::ProfileNotFound => "PROFILE_NOT_FOUND",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::Provider(_) => "INTERNAL_ERROR",
        }
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials | Self::InvalidCredential | Self::ProfileNotFound => {
                StatusCode::UNAUTHORIZED
            }
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::Provider(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        counter!("auth_errors_total", "error_type" => self.code()).increment(1);
        LumenError::from(self).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Credential and Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque access token presented by a caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for forwarding to the identity provider.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Read a credential from `Authorization: Bearer` or the session cookie.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        bearer_token(headers)
            .or_else(|| session_cookie(headers))
            .filter(|token| !token.is_empty())
            .map(Self)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| {
            s.strip_prefix("Bearer ")
                .or_else(|| s.strip_prefix("bearer "))
                .map(|s| s.trim().to_string())
        })
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
}

/// The authenticated caller.
///
/// `role` is only populated after [`AuthGuard::authorize`] has read it from
/// the caller's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    /// Provider-specific metadata (e.g. `full_name`)
    #[serde(default)]
    pub attributes: Row,
}

impl Identity {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(|v| v.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves callers and checks their roles.
///
/// Holds no state of its own; every call goes to the provider or store.
#[derive(Clone)]
pub struct AuthGuard {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn DataStore>,
}

impl fmt::Debug for AuthGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGuard").finish_non_exhaustive()
    }
}

impl AuthGuard {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn DataStore>) -> Self {
        Self { provider, store }
    }

    /// Resolve the identity behind `credential`.
    pub async fn authenticate(&self, credential: Option<&Credential>) -> Result<Identity, AuthError> {
        let credential = credential.ok_or(AuthError::MissingCredentials)?;

        let identity = self
            .provider
            .resolve(credential)
            .await?
            .ok_or(AuthError::InvalidCredential)?;

        counter!("auth_success_total").increment(1);
        debug!(user_id = %identity.id, "Caller authenticated");
        Ok(identity)
    }

    /// Require the caller's stored role to equal `required_role` exactly.
    ///
    /// Returns the identity with `role` filled in from the profile.
    pub async fn authorize(&self, mut identity: Identity, required_role: &str) -> Result<Identity, AuthError> {
        let profile = self
            .store
            .query_one(PROFILES_TABLE, &Filter::new().eq("id", identity.id.as_str()))
            .await?
            .ok_or(AuthError::ProfileNotFound)?;

        let role = profile.get("role").and_then(|v| v.as_str());
        if role != Some(required_role) {
            debug!(user_id = %identity.id, ?role, required_role, "Role check failed");
            return Err(AuthError::InsufficientPermissions);
        }

        identity.role = role.map(str::to_string);
        Ok(identity)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Extractors
// ═══════════════════════════════════════════════════════════════════════════════

/// Extractor for the identity placed on the request by the pipeline.
#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AuthError::MissingCredentials)
    }
}

/// Extractor for routes that serve anonymous and authenticated callers alike.
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<Identity>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(parts.extensions.get::<Identity>().cloned()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
