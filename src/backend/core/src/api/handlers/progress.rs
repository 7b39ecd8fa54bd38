use axum::{extract::State, response::IntoResponse, Json};
use serde_json::{json, Value};
use tracing::info;

use super::{into_row, now, row_str};
use crate::api::handlers::lessons::PROGRESS_KEY;
use crate::api::{
    extract::{ApiQuery, ValidatedJson},
    ApiResponse, AppState,
};
use crate::db::{DataStore, DbError, Filter};
use crate::domain::{progress, tables, ProgressQuery, ProgressUpdate};
use crate::error::LumenError;
use crate::middleware::auth::Identity;

async fn lesson_ids(store: &dyn DataStore, course_id: &str) -> Result<Vec<String>, DbError> {
    let lessons = store
        .query(tables::LESSONS, &Filter::new().eq("course_id", course_id), None)
        .await?;
    Ok(lessons
        .iter()
        .filter_map(|lesson| row_str(lesson, "id").map(str::to_string))
        .collect())
}

fn completed_filter(user_id: &str, lesson_ids: &[String]) -> Filter {
    Filter::new()
        .eq("user_id", user_id)
        .eq("is_completed", true)
        .in_list("lesson_id", lesson_ids.iter().cloned())
}

/// Mark a lesson complete and recompute the caller's progress in its course.
pub async fn update_progress(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(update): ValidatedJson<ProgressUpdate>,
) -> Result<impl IntoResponse, LumenError> {
    let completed_at = now();
    state
        .store
        .upsert(
            tables::LESSON_PROGRESS,
            into_row(json!({
                "user_id": identity.id,
                "lesson_id": update.lesson_id,
                "completed_at": completed_at,
                "is_completed": true,
            })),
            PROGRESS_KEY,
        )
        .await?;

    let lessons = lesson_ids(state.store.as_ref(), &update.course_id).await?;
    let completed = if lessons.is_empty() {
        0
    } else {
        state
            .store
            .count(tables::LESSON_PROGRESS, &completed_filter(&identity.id, &lessons))
            .await?
    };

    let percentage = progress::percentage(completed as usize, lessons.len());
    let finished_at = if progress::is_complete(percentage) {
        Value::String(completed_at)
    } else {
        Value::Null
    };

    state
        .store
        .update(
            tables::ENROLLMENTS,
            into_row(json!({
                "progress": percentage,
                "completed_at": finished_at,
            })),
            &Filter::new()
                .eq("user_id", identity.id.as_str())
                .eq("course_id", update.course_id.as_str()),
        )
        .await?;

    info!(
        user_id = %identity.id,
        course_id = %update.course_id,
        progress = percentage,
        "Progress updated"
    );

    Ok(Json(ApiResponse::success(json!({ "progress": percentage }))))
}

/// Lessons of a course the caller has completed.
pub async fn get_progress(
    State(state): State<AppState>,
    identity: Identity,
    ApiQuery(query): ApiQuery<ProgressQuery>,
) -> Result<impl IntoResponse, LumenError> {
    let course_id = query
        .course_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| LumenError::bad_request("Course ID required"))?;

    let lessons = lesson_ids(state.store.as_ref(), &course_id).await?;
    let completed: Vec<String> = if lessons.is_empty() {
        Vec::new()
    } else {
        state
            .store
            .query(tables::LESSON_PROGRESS, &completed_filter(&identity.id, &lessons), None)
            .await?
            .iter()
            .filter_map(|row| row_str(row, "lesson_id").map(str::to_string))
            .collect()
    };

    Ok(Json(ApiResponse::success(json!({ "completed_lessons": completed }))))
}
