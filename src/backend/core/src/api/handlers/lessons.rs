use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::debug;

use super::{accessible_lesson, into_row, now};
use crate::api::{ApiResponse, AppState};
use crate::domain::tables;
use crate::error::LumenError;
use crate::middleware::auth::Identity;

/// Columns identifying a learner's progress row for one lesson.
pub const PROGRESS_KEY: &[&str] = &["user_id", "lesson_id"];

pub async fn get_lesson(
    State(state): State<AppState>,
    identity: Identity,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, LumenError> {
    let lesson = accessible_lesson(state.store.as_ref(), &identity.id, &lesson_id)
        .await?
        .ok_or_else(|| LumenError::not_found("Lesson not found or access denied"))?;

    state
        .store
        .upsert(
            tables::LESSON_PROGRESS,
            into_row(json!({
                "user_id": identity.id,
                "lesson_id": lesson_id,
                "last_accessed_at": now(),
            })),
            PROGRESS_KEY,
        )
        .await?;

    debug!(user_id = %identity.id, lesson_id = %lesson_id, "Lesson viewed");

    Ok(Json(ApiResponse::success(json!({ "lesson": lesson }))))
}

pub async fn complete_lesson(
    State(state): State<AppState>,
    identity: Identity,
    Path(lesson_id): Path<String>,
) -> Result<impl IntoResponse, LumenError> {
    state
        .store
        .upsert(
            tables::LESSON_PROGRESS,
            into_row(json!({
                "user_id": identity.id,
                "lesson_id": lesson_id,
                "completed_at": now(),
                "is_completed": true,
            })),
            PROGRESS_KEY,
        )
        .await?;

    debug!(user_id = %identity.id, lesson_id = %lesson_id, "Lesson completed");

    Ok(Json(ApiResponse::success(json!({ "message": "Lesson completed" }))))
}
