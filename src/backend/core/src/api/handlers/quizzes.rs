use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use tracing::info;

use super::{accessible_lesson, into_row, row_str};
use crate::api::{extract::ValidatedJson, ApiResponse, AppState};
use crate::db::{Filter, Row};
use crate::domain::quiz::DEFAULT_PASSING_SCORE;
use crate::domain::{parse_questions, sanitize, score, tables, Question, QuizSubmission};
use crate::error::LumenError;
use crate::middleware::auth::Identity;

fn stored_questions(quiz: &Row) -> Result<Vec<Question>, LumenError> {
    parse_questions(quiz.get("questions"))
        .map_err(|e| LumenError::internal(format!("malformed questions on quiz: {}", e)))
}

/// A quiz without its answers, for callers enrolled in its course.
pub async fn get_quiz(
    State(state): State<AppState>,
    identity: Identity,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, LumenError> {
    let denied = || LumenError::not_found("Quiz not found or access denied");

    let quiz = state
        .store
        .query_one(tables::QUIZZES, &Filter::new().eq("id", quiz_id.as_str()))
        .await?
        .ok_or_else(denied)?;

    let lesson_id = row_str(&quiz, "lesson_id").ok_or_else(denied)?;
    accessible_lesson(state.store.as_ref(), &identity.id, lesson_id)
        .await?
        .ok_or_else(denied)?;

    let questions = sanitize(&stored_questions(&quiz)?);
    let field = |key: &str| quiz.get(key).cloned().unwrap_or(Value::Null);

    Ok(Json(ApiResponse::success(json!({
        "id": field("id"),
        "title": field("title"),
        "description": field("description"),
        "time_limit_minutes": field("time_limit_minutes"),
        "questions": questions,
    }))))
}

pub async fn submit_quiz(
    State(state): State<AppState>,
    identity: Identity,
    Path(quiz_id): Path<String>,
    ValidatedJson(submission): ValidatedJson<QuizSubmission>,
) -> Result<impl IntoResponse, LumenError> {
    let quiz = state
        .store
        .query_one(tables::QUIZZES, &Filter::new().eq("id", quiz_id.as_str()))
        .await?
        .ok_or_else(|| LumenError::not_found("Quiz not found"))?;

    let questions = stored_questions(&quiz)?;
    let passing_score = quiz
        .get("passing_score")
        .and_then(Value::as_f64)
        .unwrap_or(DEFAULT_PASSING_SCORE);

    let graded = score(&questions, &submission.answers, passing_score);

    let stored = state
        .store
        .insert(
            tables::QUIZ_SUBMISSIONS,
            into_row(json!({
                "user_id": identity.id,
                "quiz_id": quiz_id,
                "answers": submission.answers,
                "score": graded.score,
                "passed": graded.passed,
            })),
        )
        .await?;

    info!(
        user_id = %identity.id,
        quiz_id = %quiz_id,
        score = graded.score,
        passed = graded.passed,
        "Quiz submitted"
    );

    Ok(Json(ApiResponse::success(json!({
        "submission": stored,
        "score": graded.score,
        "passed": graded.passed,
        "results": graded.results,
    }))))
}
