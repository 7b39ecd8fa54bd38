//! Course platform domain: request payloads, quiz grading, progress.

pub mod progress;
pub mod quiz;
pub mod requests;

pub use quiz::{parse_questions, sanitize, score, PublicQuestion, Question, QuestionResult, QuizScore};
pub use requests::{
    CourseInput, CourseQuery, LoginRequest, ProgressQuery, ProgressUpdate, QuizAnswer, QuizSubmission,
    SignupRequest, COURSE_LEVELS,
};

/// Table names used by the handlers.
pub mod tables {
    pub const PROFILES: &str = "profiles";
    pub const COURSES: &str = "courses";
    pub const ENROLLMENTS: &str = "enrollments";
    pub const LESSONS: &str = "lessons";
    pub const LESSON_PROGRESS: &str = "lesson_progress";
    pub const QUIZZES: &str = "quizzes";
    pub const QUIZ_SUBMISSIONS: &str = "quiz_submissions";
}
