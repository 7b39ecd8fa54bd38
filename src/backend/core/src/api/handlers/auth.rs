use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::{info, warn};

use super::into_row;
use crate::api::{extract::ValidatedJson, ApiResponse, AppState};
use crate::domain::{tables, LoginRequest, SignupRequest};
use crate::error::LumenError;
use crate::middleware::auth::ROLE_STUDENT;

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, LumenError> {
    let session = state.identity.sign_in(&req.email, &req.password).await?;

    info!(user_id = %session.user.id, "User signed in");

    Ok(Json(ApiResponse::success(json!({
        "user": session.user,
        "session": session,
    }))))
}

pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<impl IntoResponse, LumenError> {
    let user = state
        .identity
        .sign_up(&req.email, &req.password, &req.full_name)
        .await?;

    let profile = into_row(json!({
        "id": user.id,
        "email": req.email,
        "full_name": req.full_name,
        "role": ROLE_STUDENT,
    }));
    if let Err(e) = state.store.insert(tables::PROFILES, profile).await {
        warn!(user_id = %user.id, error = %e, "Profile creation failed");
    }

    let session = match state.identity.sign_in(&req.email, &req.password).await {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(user_id = %user.id, error = %e, "Automatic sign-in after signup failed");
            None
        }
    };

    info!(user_id = %user.id, "User signed up");

    Ok(Json(ApiResponse::success(json!({
        "user": user,
        "auto_logged_in": session.is_some(),
        "session": session,
    }))))
}
