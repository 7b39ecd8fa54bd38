//! Validator trait and builders.
//!
//! - `Validate` for request types
//! - `FieldValidator` for chaining rules on one field
//! - `RequestValidator` for collecting errors across a whole payload

use crate::validation::error::{ValidationErrors, ValidationResult};
use crate::validation::rules::ValidationRule;

// ═══════════════════════════════════════════════════════════════════════════════
// Validate Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for types that can be validated.
pub trait Validate {
    fn validate(&self) -> ValidationResult<()>;

    /// Validate and return self if valid, otherwise return errors.
    fn validated(self) -> ValidationResult<Self>
    where
        Self: Sized,
    {
        self.validate()?;
        Ok(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Field Validator
// ═══════════════════════════════════════════════════════════════════════════════

/// A builder for validating a single field with multiple rules.
pub struct FieldValidator<'a, T: ?Sized> {
    field_name: &'a str,
    value: &'a T,
    messages: Vec<String>,
}

impl<'a, T: ?Sized> FieldValidator<'a, T> {
    pub fn new(field_name: &'a str, value: &'a T) -> Self {
        Self {
            field_name,
            value,
            messages: Vec::new(),
        }
    }

    /// Apply a rule, keeping its default message.
    pub fn rule<R: ValidationRule<T>>(mut self, rule: R) -> Self {
        if let Some(message) = rule.check(self.value) {
            self.messages.push(message);
        }
        self
    }

    /// Apply a rule, reporting `message` instead of the rule's own.
    pub fn rule_with_message<R: ValidationRule<T>>(mut self, rule: R, message: &str) -> Self {
        if rule.check(self.value).is_some() {
            self.messages.push(message.to_string());
        }
        self
    }

    /// Apply a boolean check.
    pub fn must<F>(mut self, predicate: F, message: &str) -> Self
    where
        F: FnOnce(&T) -> bool,
    {
        if !predicate(self.value) {
            self.messages.push(message.to_string());
        }
        self
    }

    pub fn field_name(&self) -> &str {
        self.field_name
    }

    pub fn is_valid(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request Validator
// ═══════════════════════════════════════════════════════════════════════════════

/// A builder for validating entire request objects with multiple fields.
#[derive(Debug, Default)]
pub struct RequestValidator {
    errors: ValidationErrors,
}

impl RequestValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the errors of a field validator.
    pub fn field<T: ?Sized>(mut self, validator: FieldValidator<'_, T>) -> Self {
        let field_name = validator.field_name().to_string();
        for message in validator.into_messages() {
            self.errors.add(field_name.clone(), message);
        }
        self
    }

    /// Validate every item of a list, prefixing paths with `field[index]`.
    pub fn items<V: Validate>(mut self, field: &str, items: &[V]) -> Self {
        for (index, item) in items.iter().enumerate() {
            if let Err(item_errors) = item.validate() {
                self.errors.merge_array_item(field, index, item_errors);
            }
        }
        self
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn result(self) -> ValidationResult<()> {
        self.errors.into_result()
    }
}
