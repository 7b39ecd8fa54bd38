//! Request payloads accepted by the API, with their validation rules.

use serde::{Deserialize, Serialize};

use crate::validation::{
    validate_field, validate_request, Email, Min, MinLength, OneOf, Required, Url, Uuid, Validate,
    ValidationResult,
};

/// Accepted course levels.
pub const COURSE_LEVELS: &[&str] = &["beginner", "intermediate", "advanced"];

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(validate_field("email", &self.email).rule(Email))
            .field(validate_field("password", &self.password).rule(MinLength(6)))
            .result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(alias = "fullName")]
    pub full_name: String,
}

impl Validate for SignupRequest {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(validate_field("email", &self.email).rule(Email))
            .field(validate_field("password", &self.password).rule(MinLength(6)))
            .field(validate_field("full_name", &self.full_name).rule(MinLength(2)))
            .result()
    }
}

/// New course submitted by an author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseInput {
    pub title: String,
    pub description: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub price: f64,
    pub level: String,
    #[serde(default)]
    pub is_published: bool,
}

impl Validate for CourseInput {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(validate_field("title", &self.title).rule(Required))
            .field(validate_field("description", &self.description).rule(MinLength(10)))
            .field(validate_field("slug", &self.slug).rule(Required))
            .field(validate_field("thumbnail_url", &self.thumbnail_url).rule(Url))
            .field(validate_field("price", &self.price).rule(Min(0.0)))
            .field(validate_field("level", &self.level).rule(OneOf(COURSE_LEVELS)))
            .result()
    }
}

/// One answer in a quiz submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAnswer {
    #[serde(alias = "questionId")]
    pub question_id: String,
    #[serde(alias = "selectedAnswer")]
    pub selected_answer: String,
}

impl Validate for QuizAnswer {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(validate_field("question_id", &self.question_id).rule(Required))
            .result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuizSubmission {
    pub answers: Vec<QuizAnswer>,
}

impl Validate for QuizSubmission {
    fn validate(&self) -> ValidationResult<()> {
        validate_request().items("answers", &self.answers).result()
    }
}

/// Marks a lesson complete and recomputes course progress.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressUpdate {
    #[serde(alias = "lessonId")]
    pub lesson_id: String,
    #[serde(alias = "courseId")]
    pub course_id: String,
}

impl Validate for ProgressUpdate {
    fn validate(&self) -> ValidationResult<()> {
        validate_request()
            .field(validate_field("lesson_id", &self.lesson_id).rule(Uuid))
            .field(validate_field("course_id", &self.course_id).rule(Uuid))
            .result()
    }
}

/// Query string of `GET /api/courses`.
#[derive(Debug, Clone, Deserialize)]
pub struct CourseQuery {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for CourseQuery {
    fn default() -> Self {
        Self {
            search: None,
            level: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

fn default_limit() -> usize {
    10
}

/// Query string of `GET /api/progress`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressQuery {
    #[serde(default, alias = "courseId")]
    pub course_id: Option<String>,
}
