//! End-to-end tests for the HTTP API against the in-memory backend.
//!
//! Tests cover:
//! - Health and metrics endpoints
//! - Signup and login, including validation failures
//! - Course listing filters and author-only creation
//! - Enrollment, lesson access and completion
//! - Quiz retrieval without answers and grading
//! - Progress tracking
//! - Per-route budgets

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use lumen_core::api::{build_router, AppState};
use lumen_core::db::{DataStore, IdentityProvider, MemoryStore, Row};
use lumen_core::middleware::auth::{ROLE_AUTHOR, ROLE_STUDENT};
use lumen_core::middleware::rate_limit::{RateLimitConfig, RateLimitService};
use lumen_core::telemetry::MetricsRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

// ============================================================================
// Helpers
// ============================================================================

fn app_with(config: RateLimitConfig) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let limiter = Arc::new(RateLimitService::new(config));
    let state = AppState::new(store.clone(), store.clone(), limiter, MetricsRegistry::disabled());
    (build_router(state), store)
}

fn app() -> (Router, Arc<MemoryStore>) {
    app_with(RateLimitConfig::builder().enabled(false).build())
}

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Create a user with a profile and return `(user_id, token)`.
async fn user(store: &MemoryStore, email: &str, role: &str) -> (String, String) {
    let identity = store.sign_up(email, "password1", "Test User").await.unwrap();
    store
        .insert("profiles", row(json!({"id": identity.id, "full_name": "Test User", "role": role})))
        .await
        .unwrap();
    let session = store.sign_in(email, "password1").await.unwrap();
    (identity.id, session.access_token)
}

struct Catalog {
    course_id: String,
    lesson_ids: Vec<String>,
    quiz_id: String,
}

/// One published course with two lessons and a two-question quiz on the first.
async fn seed_catalog(store: &MemoryStore, instructor_id: &str) -> Catalog {
    let course_id = uuid::Uuid::new_v4().to_string();
    store
        .insert(
            "courses",
            row(json!({
                "id": course_id,
                "title": "Rust Ownership",
                "description": "Borrowing, lifetimes and moves",
                "level": "beginner",
                "is_published": true,
                "instructor_id": instructor_id,
            })),
        )
        .await
        .unwrap();

    let mut lesson_ids = Vec::new();
    for position in 0..2 {
        let lesson_id = uuid::Uuid::new_v4().to_string();
        store
            .insert(
                "lessons",
                row(json!({"id": lesson_id, "course_id": course_id, "title": format!("Lesson {}", position)})),
            )
            .await
            .unwrap();
        lesson_ids.push(lesson_id);
    }

    let quiz_id = uuid::Uuid::new_v4().to_string();
    store
        .insert(
            "quizzes",
            row(json!({
                "id": quiz_id,
                "lesson_id": lesson_ids[0],
                "title": "Checkpoint",
                "passing_score": 50,
                "questions": [
                    {"id": "q1", "question": "Who owns a moved value?", "options": ["caller", "callee"], "type": "single", "correct_answer": "callee"},
                    {"id": "q2", "question": "Shared borrow syntax?", "options": ["&", "&mut"], "type": "single", "correct_answer": "&"}
                ]
            })),
        )
        .await
        .unwrap();

    Catalog {
        course_id,
        lesson_ids,
        quiz_id,
    }
}

// ============================================================================
// Health and Metrics
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let (app, _store) = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint_without_recorder() {
    let (app, _store) = app();
    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

// ============================================================================
// Auth
// ============================================================================

#[tokio::test]
async fn test_signup_creates_student_profile_and_session() {
    let (app, store) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({"email": "new@example.com", "password": "password1", "fullName": "New Learner"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["auto_logged_in"], true);
    let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();

    let profile = store
        .query_one("profiles", &lumen_core::db::Filter::new().eq("id", user_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile["role"], ROLE_STUDENT);
    assert_eq!(profile["full_name"], "New Learner");
}

#[tokio::test]
async fn test_signup_validation_failure_lists_fields() {
    let (app, _store) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({"email": "nope", "password": "123", "full_name": "N"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let fields = &body["error"]["details"]["fields"];
    assert!(fields["email"].is_array());
    assert!(fields["password"].is_array());
    assert!(fields["full_name"].is_array());
}

#[tokio::test]
async fn test_duplicate_signup_returns_backend_message() {
    let (app, store) = app();
    user(&store, "taken@example.com", ROLE_STUDENT).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({"email": "taken@example.com", "password": "password1", "full_name": "Again"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "User already registered");
}

#[tokio::test]
async fn test_login_success_and_wrong_password() {
    let (app, store) = app();
    user(&store, "login@example.com", ROLE_STUDENT).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "login@example.com", "password": "password1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["session"]["access_token"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "login@example.com", "password": "wrong-password"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid login credentials");
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let (app, _store) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Courses
// ============================================================================

#[tokio::test]
async fn test_list_courses_filters_and_decorates() {
    let (app, store) = app();
    let (author_id, _) = user(&store, "author@example.com", ROLE_AUTHOR).await;
    let catalog = seed_catalog(&store, &author_id).await;
    store
        .insert(
            "courses",
            row(json!({"title": "Draft", "description": "Not yet", "level": "beginner", "is_published": false})),
        )
        .await
        .unwrap();
    store
        .insert(
            "enrollments",
            row(json!({"user_id": "someone", "course_id": catalog.course_id})),
        )
        .await
        .unwrap();

    let (status, body) = send(&app, Method::GET, "/api/courses", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let courses = body["data"]["courses"].as_array().unwrap();
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["instructor"]["full_name"], "Test User");
    assert_eq!(courses[0]["enrollment_count"], 1);

    let (_, body) = send(&app, Method::GET, "/api/courses?search=LIFETIMES", None, None).await;
    assert_eq!(body["data"]["courses"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::GET, "/api/courses?level=advanced", None, None).await;
    assert!(body["data"]["courses"].as_array().unwrap().is_empty());

    let (_, body) = send(&app, Method::GET, "/api/courses?offset=1", None, None).await;
    assert!(body["data"]["courses"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_create_course_requires_author() {
    let (app, store) = app();
    let (_, student) = user(&store, "student@example.com", ROLE_STUDENT).await;
    let (author_id, author) = user(&store, "author@example.com", ROLE_AUTHOR).await;
    let course = json!({
        "title": "Async Rust",
        "description": "Futures, executors and pinning",
        "slug": "async-rust",
        "price": 49.0,
        "level": "advanced"
    });

    let (status, _) = send(&app, Method::POST, "/api/courses", None, Some(course.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::POST, "/api/courses", Some(&student), Some(course.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/api/courses", Some(&author), Some(course)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["course"]["instructor_id"], author_id);
    assert_eq!(body["data"]["course"]["is_published"], false);
}

#[tokio::test]
async fn test_create_course_rejects_invalid_level() {
    let (app, store) = app();
    let (_, author) = user(&store, "author@example.com", ROLE_AUTHOR).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/courses",
        Some(&author),
        Some(json!({
            "title": "Async Rust",
            "description": "Futures, executors and pinning",
            "slug": "async-rust",
            "price": 10,
            "level": "expert"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["fields"]["level"].is_array());
}

// ============================================================================
// Enrollment and Lessons
// ============================================================================

#[tokio::test]
async fn test_enroll_twice_is_rejected_and_unenroll_removes() {
    let (app, store) = app();
    let (author_id, _) = user(&store, "author@example.com", ROLE_AUTHOR).await;
    let (_, student) = user(&store, "student@example.com", ROLE_STUDENT).await;
    let catalog = seed_catalog(&store, &author_id).await;
    let uri = format!("/api/courses/{}/enroll", catalog.course_id);

    let (status, body) = send(&app, Method::POST, &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["enrollment"]["course_id"], catalog.course_id.as_str());

    let (status, body) = send(&app, Method::POST, &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Already enrolled");

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.table_len("enrollments"), 0);
}

#[tokio::test]
async fn test_lesson_requires_enrollment_and_tracks_access() {
    let (app, store) = app();
    let (author_id, _) = user(&store, "author@example.com", ROLE_AUTHOR).await;
    let (_, student) = user(&store, "student@example.com", ROLE_STUDENT).await;
    let catalog = seed_catalog(&store, &author_id).await;
    let lesson_uri = format!("/api/lessons/{}", catalog.lesson_ids[0]);

    let (status, body) = send(&app, Method::GET, &lesson_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Lesson not found or access denied");

    let (status, _) = send(&app, Method::GET, "/api/lessons/missing", Some(&student), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(
        &app,
        Method::POST,
        &format!("/api/courses/{}/enroll", catalog.course_id),
        Some(&student),
        None,
    )
    .await;

    let (status, body) = send(&app, Method::GET, &lesson_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["lesson"]["title"], "Lesson 0");
    assert_eq!(store.table_len("lesson_progress"), 1);

    // A second view updates the same progress row.
    send(&app, Method::GET, &lesson_uri, Some(&student), None).await;
    assert_eq!(store.table_len("lesson_progress"), 1);

    let (status, body) = send(&app, Method::POST, &format!("{}/complete", lesson_uri), Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Lesson completed");
    assert_eq!(store.table_len("lesson_progress"), 1);
}

// ============================================================================
// Quizzes
// ============================================================================

#[tokio::test]
async fn test_quiz_view_hides_answers_and_submit_grades() {
    let (app, store) = app();
    let (author_id, _) = user(&store, "author@example.com", ROLE_AUTHOR).await;
    let (_, student) = user(&store, "student@example.com", ROLE_STUDENT).await;
    let catalog = seed_catalog(&store, &author_id).await;
    let quiz_uri = format!("/api/quizzes/{}", catalog.quiz_id);

    let (status, body) = send(&app, Method::GET, &quiz_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Quiz not found or access denied");

    send(
        &app,
        Method::POST,
        &format!("/api/courses/{}/enroll", catalog.course_id),
        Some(&student),
        None,
    )
    .await;

    let (status, body) = send(&app, Method::GET, &quiz_uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    let questions = body["data"]["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.get("correct_answer").is_none()));
    assert_eq!(questions[0]["type"], "single");

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{}/submit", quiz_uri),
        Some(&student),
        Some(json!({"answers": [
            {"question_id": "q2", "selected_answer": "&"},
            {"question_id": "q1", "selected_answer": "caller"}
        ]})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["score"], 50.0);
    assert_eq!(body["data"]["passed"], true);
    assert_eq!(body["data"]["results"][0]["is_correct"], false);
    assert_eq!(body["data"]["results"][1]["is_correct"], true);
    assert!(body["data"]["submission"]["id"].is_string());
    assert_eq!(store.table_len("quiz_submissions"), 1);
}

#[tokio::test]
async fn test_submit_unknown_quiz_is_404() {
    let (app, store) = app();
    let (_, student) = user(&store, "student@example.com", ROLE_STUDENT).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/quizzes/nope/submit",
        Some(&student),
        Some(json!({"answers": []})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Quiz not found");
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn test_progress_update_and_read() {
    let (app, store) = app();
    let (author_id, _) = user(&store, "author@example.com", ROLE_AUTHOR).await;
    let (_, student) = user(&store, "student@example.com", ROLE_STUDENT).await;
    let catalog = seed_catalog(&store, &author_id).await;
    send(
        &app,
        Method::POST,
        &format!("/api/courses/{}/enroll", catalog.course_id),
        Some(&student),
        None,
    )
    .await;

    let (status, body) = send(&app, Method::GET, "/api/progress", Some(&student), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Course ID required");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/progress",
        Some(&student),
        Some(json!({"lessonId": catalog.lesson_ids[0], "courseId": catalog.course_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["progress"], 50.0);

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/progress",
        Some(&student),
        Some(json!({"lesson_id": catalog.lesson_ids[1], "course_id": catalog.course_id})),
    )
    .await;
    assert_eq!(body["data"]["progress"], 100.0);

    let enrollment = store
        .query_one(
            "enrollments",
            &lumen_core::db::Filter::new().eq("course_id", catalog.course_id.as_str()),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(enrollment["progress"], 100.0);
    assert!(enrollment["completed_at"].is_string());

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/progress?course_id={}", catalog.course_id),
        Some(&student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let mut completed: Vec<String> = body["data"]["completed_lessons"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    completed.sort();
    let mut expected = catalog.lesson_ids.clone();
    expected.sort();
    assert_eq!(completed, expected);
}

#[tokio::test]
async fn test_progress_rejects_non_uuid_ids() {
    let (app, store) = app();
    let (_, student) = user(&store, "student@example.com", ROLE_STUDENT).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/progress",
        Some(&student),
        Some(json!({"lesson_id": "lesson-1", "course_id": "course-1"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["fields"]["lesson_id"].is_array());
}

// ============================================================================
// Budgets
// ============================================================================

#[tokio::test]
async fn test_signup_budget_is_three_per_window() {
    let (app, _store) = app_with(RateLimitConfig::default());

    for i in 0..3 {
        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/signup",
            None,
            Some(json!({"email": format!("user{}@example.com", i), "password": "password1", "full_name": "Learner"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/signup",
        None,
        Some(json!({"email": "user9@example.com", "password": "password1", "full_name": "Learner"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["message"], "Too many requests");
}

#[tokio::test]
async fn test_rate_limit_runs_before_validation() {
    let (app, _store) = app_with(RateLimitConfig::default());
    let bad = json!({"email": "x", "password": "1"});

    for _ in 0..5 {
        let (status, _) = send(&app, Method::POST, "/api/auth/login", None, Some(bad.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (status, _) = send(&app, Method::POST, "/api/auth/login", None, Some(bad)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
