//! Quiz questions and scoring.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::requests::QuizAnswer;

/// Passing threshold for quizzes that do not set one.
pub const DEFAULT_PASSING_SCORE: f64 = 70.0;

/// A stored quiz question, answer included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
}

/// A question as shown to students.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicQuestion {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question: q.question.clone(),
            options: q.options.clone(),
            kind: q.kind.clone(),
        }
    }
}

/// Parse the `questions` column of a quiz row. Missing or null means no questions.
pub fn parse_questions(value: Option<&Value>) -> Result<Vec<Question>, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => serde_json::from_value(v.clone()),
    }
}

/// Strip answers before questions leave the server.
pub fn sanitize(questions: &[Question]) -> Vec<PublicQuestion> {
    questions.iter().map(PublicQuestion::from).collect()
}

/// Grading of a single question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub user_answer: Option<String>,
    pub correct_answer: Option<String>,
    pub is_correct: bool,
}

/// Grading of a whole submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizScore {
    /// Percentage of correctly answered questions
    pub score: f64,
    pub passed: bool,
    pub results: Vec<QuestionResult>,
}

/// Grade `answers` against `questions`, matching on question id.
///
/// Unanswered questions count as wrong; answers to unknown questions are
/// ignored. An empty quiz scores 0.
pub fn score(questions: &[Question], answers: &[QuizAnswer], passing_score: f64) -> QuizScore {
    let by_question: HashMap<&str, &str> = answers
        .iter()
        .map(|a| (a.question_id.as_str(), a.selected_answer.as_str()))
        .collect();

    let results: Vec<QuestionResult> = questions
        .iter()
        .map(|q| {
            let user_answer = by_question.get(q.id.as_str()).copied();
            let is_correct = matches!(
                (user_answer, q.correct_answer.as_deref()),
                (Some(given), Some(expected)) if given == expected
            );
            QuestionResult {
                question_id: q.id.clone(),
                user_answer: user_answer.map(str::to_string),
                correct_answer: q.correct_answer.clone(),
                is_correct,
            }
        })
        .collect();

    let correct = results.iter().filter(|r| r.is_correct).count();
    let score = if questions.is_empty() {
        0.0
    } else {
        correct as f64 / questions.len() as f64 * 100.0
    };

    QuizScore {
        score,
        passed: score >= passing_score,
        results,
    }
}
