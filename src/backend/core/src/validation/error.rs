//! Validation error types with field-level error support.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A collection of validation messages organized by field path.
///
/// Field paths use dots for nesting and brackets for list items, for example
/// `answers[2].question_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    #[serde(flatten)]
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Total number of messages across all fields.
    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.errors.get(field)
    }

    pub fn has_errors(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    /// Merge errors reported by the item at `index` of list `field`.
    pub fn merge_array_item(&mut self, field: &str, index: usize, other: ValidationErrors) {
        for (nested, messages) in other.errors {
            let path = if nested.is_empty() {
                format!("{}[{}]", field, index)
            } else {
                format!("{}[{}].{}", field, index, nested)
            };
            self.errors.entry(path).or_default().extend(messages);
        }
    }

    /// Iterate over field paths and their messages, ordered by path.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.errors.iter()
    }

    /// Convert to a ValidationResult.
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self
            .errors
            .iter()
            .flat_map(|(field, messages)| messages.iter().map(move |m| format!("{}: {}", field, m)))
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Result type for validation operations.
pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;
