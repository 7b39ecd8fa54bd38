//! API request handlers.
//!
//! Handlers run behind the request pipeline, so callers are already
//! authenticated, authorized and rate limited. All of them return
//! `Result<_, LumenError>` and let the error's `IntoResponse` pick the status.

pub mod auth;
pub mod courses;
pub mod health;
pub mod lessons;
pub mod progress;
pub mod quizzes;

use serde_json::Value;

use crate::db::{DataStore, DbError, Filter, Row};
use crate::domain::tables;
use crate::error::LumenError;

/// Turn a JSON object literal into a row.
pub(crate) fn into_row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

pub(crate) fn row_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// The caller's enrollment in `course_id`, if any.
pub(crate) async fn find_enrollment(
    store: &dyn DataStore,
    user_id: &str,
    course_id: &str,
) -> Result<Option<Row>, DbError> {
    store
        .query_one(
            tables::ENROLLMENTS,
            &Filter::new().eq("user_id", user_id).eq("course_id", course_id),
        )
        .await
}

/// The lesson, provided the caller is enrolled in its course.
pub(crate) async fn accessible_lesson(
    store: &dyn DataStore,
    user_id: &str,
    lesson_id: &str,
) -> Result<Option<Row>, LumenError> {
    let Some(lesson) = store
        .query_one(tables::LESSONS, &Filter::new().eq("id", lesson_id))
        .await?
    else {
        return Ok(None);
    };

    let Some(course_id) = row_str(&lesson, "course_id") else {
        return Ok(None);
    };

    if find_enrollment(store, user_id, course_id).await?.is_none() {
        return Ok(None);
    }

    Ok(Some(lesson))
}
