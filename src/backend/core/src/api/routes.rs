//! Route table.
//!
//! | Route | Auth | Role | Budget/min |
//! |---|---|---|---|
//! | `GET /health` | no | | not limited |
//! | `GET /metrics` | no | | not limited |
//! | `POST /api/auth/login` | no | | 5 |
//! | `POST /api/auth/signup` | no | | 3 |
//! | `GET /api/courses` | no | | 30 |
//! | `POST /api/courses` | yes | author | 5 |
//! | `POST /api/courses/:id/enroll` | yes | | 10 |
//! | `DELETE /api/courses/:id/enroll` | yes | | 10 |
//! | `GET /api/lessons/:id` | yes | | 60 |
//! | `POST /api/lessons/:id/complete` | yes | | 30 |
//! | `GET /api/quizzes/:id` | yes | | 20 |
//! | `POST /api/quizzes/:id/submit` | yes | | 5 |
//! | `GET /api/progress` | yes | | 60 |
//! | `POST /api/progress` | yes | | 30 |

use axum::{
    handler::Handler,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers::{auth, courses, health, lessons, progress, quizzes};
use super::AppState;
use crate::middleware::auth::ROLE_AUTHOR;
use crate::middleware::pipeline::{Pipeline, PipelineLayer, RouteGuard};

pub const LOGIN: RouteGuard = RouteGuard::public(5);
pub const SIGNUP: RouteGuard = RouteGuard::public(3);
pub const LIST_COURSES: RouteGuard = RouteGuard::public(30);
pub const CREATE_COURSE: RouteGuard = RouteGuard::role(ROLE_AUTHOR, 5);
pub const ENROLL: RouteGuard = RouteGuard::authenticated(10);
pub const VIEW_LESSON: RouteGuard = RouteGuard::authenticated(60);
pub const COMPLETE_LESSON: RouteGuard = RouteGuard::authenticated(30);
pub const VIEW_QUIZ: RouteGuard = RouteGuard::authenticated(20);
pub const SUBMIT_QUIZ: RouteGuard = RouteGuard::authenticated(5);
pub const READ_PROGRESS: RouteGuard = RouteGuard::authenticated(60);
pub const WRITE_PROGRESS: RouteGuard = RouteGuard::authenticated(30);

/// All routes, still expecting [`AppState`].
pub fn api_router(pipeline: Arc<Pipeline>) -> Router<AppState> {
    let guard = |route: RouteGuard| PipelineLayer::new(pipeline.clone(), route);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::prometheus_metrics))
        .route("/api/auth/login", post(auth::login.layer(guard(LOGIN))))
        .route("/api/auth/signup", post(auth::signup.layer(guard(SIGNUP))))
        .route(
            "/api/courses",
            get(courses::list_courses.layer(guard(LIST_COURSES)))
                .post(courses::create_course.layer(guard(CREATE_COURSE))),
        )
        .route(
            "/api/courses/:id/enroll",
            post(courses::enroll.layer(guard(ENROLL)))
                .delete(courses::unenroll.layer(guard(ENROLL))),
        )
        .route("/api/lessons/:id", get(lessons::get_lesson.layer(guard(VIEW_LESSON))))
        .route(
            "/api/lessons/:id/complete",
            post(lessons::complete_lesson.layer(guard(COMPLETE_LESSON))),
        )
        .route("/api/quizzes/:id", get(quizzes::get_quiz.layer(guard(VIEW_QUIZ))))
        .route(
            "/api/quizzes/:id/submit",
            post(quizzes::submit_quiz.layer(guard(SUBMIT_QUIZ))),
        )
        .route(
            "/api/progress",
            get(progress::get_progress.layer(guard(READ_PROGRESS)))
                .post(progress::update_progress.layer(guard(WRITE_PROGRESS))),
        )
}
