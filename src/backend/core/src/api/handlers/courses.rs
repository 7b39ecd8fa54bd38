use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::{find_enrollment, into_row, now, row_str};
use crate::api::{
    extract::{ApiQuery, ValidatedJson},
    ApiResponse, AppState,
};
use crate::db::{Filter, Page};
use crate::domain::{tables, CourseInput, CourseQuery};
use crate::error::LumenError;
use crate::middleware::auth::Identity;

/// Upper bound on `limit` for course listings.
pub const MAX_PAGE_SIZE: usize = 100;

/// Published courses with instructor and enrollment count attached.
pub async fn list_courses(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CourseQuery>,
) -> Result<impl IntoResponse, LumenError> {
    let mut filter = Filter::new().eq("is_published", true);
    if let Some(level) = query.level.as_deref().filter(|l| !l.is_empty()) {
        filter = filter.eq("level", level);
    }
    if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        filter = filter.search(["title", "description"], search.trim());
    }

    let page = Page::new(query.offset, query.limit.min(MAX_PAGE_SIZE));
    let rows = state.store.query(tables::COURSES, &filter, Some(page)).await?;

    let mut courses = Vec::with_capacity(rows.len());
    for mut course in rows {
        let instructor = match row_str(&course, "instructor_id") {
            Some(instructor_id) => state
                .store
                .query_one(tables::PROFILES, &Filter::new().eq("id", instructor_id))
                .await?
                .map(|profile| {
                    json!({
                        "full_name": profile.get("full_name").cloned().unwrap_or(Value::Null),
                        "avatar_url": profile.get("avatar_url").cloned().unwrap_or(Value::Null),
                    })
                })
                .unwrap_or(Value::Null),
            None => Value::Null,
        };

        let enrollment_count = match row_str(&course, "id") {
            Some(course_id) => {
                state
                    .store
                    .count(tables::ENROLLMENTS, &Filter::new().eq("course_id", course_id))
                    .await?
            }
            None => 0,
        };

        course.insert("instructor".into(), instructor);
        course.insert("enrollment_count".into(), json!(enrollment_count));
        courses.push(Value::Object(course));
    }

    Ok(Json(ApiResponse::success(json!({ "courses": courses }))))
}

pub async fn create_course(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(input): ValidatedJson<CourseInput>,
) -> Result<impl IntoResponse, LumenError> {
    let mut row = into_row(serde_json::to_value(&input)?);
    row.insert("instructor_id".into(), json!(identity.id));

    let course = state.store.insert(tables::COURSES, row).await?;

    info!(instructor_id = %identity.id, slug = %input.slug, "Course created");

    Ok((StatusCode::CREATED, Json(ApiResponse::success(json!({ "course": course })))))
}

pub async fn enroll(
    State(state): State<AppState>,
    identity: Identity,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, LumenError> {
    if find_enrollment(state.store.as_ref(), &identity.id, &course_id)
        .await?
        .is_some()
    {
        return Err(LumenError::already_exists("Already enrolled"));
    }

    let enrollment = state
        .store
        .insert(
            tables::ENROLLMENTS,
            into_row(json!({
                "user_id": identity.id,
                "course_id": course_id,
                "enrolled_at": now(),
                "progress": 0.0,
            })),
        )
        .await?;

    info!(user_id = %identity.id, course_id = %course_id, "Enrolled");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(json!({ "enrollment": enrollment }))),
    ))
}

pub async fn unenroll(
    State(state): State<AppState>,
    identity: Identity,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, LumenError> {
    let removed = state
        .store
        .delete(
            tables::ENROLLMENTS,
            &Filter::new().eq("user_id", identity.id.as_str()).eq("course_id", course_id.as_str()),
        )
        .await?;

    info!(user_id = %identity.id, course_id = %course_id, removed, "Unenrolled");

    Ok(Json(ApiResponse::success(json!({ "message": "Unenrolled successfully" }))))
}
