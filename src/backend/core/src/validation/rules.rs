//! Validation rules for request payloads.
//!
//! A rule inspects one value and returns a message when the value is
//! rejected. Rules on `Option<T>` accept `None`; presence is checked by the
//! type being deserialized, not by the rule.

use regex::Regex;
use std::sync::LazyLock;

// ═══════════════════════════════════════════════════════════════════════════════
// Pre-compiled Regex Patterns
// ═══════════════════════════════════════════════════════════════════════════════

/// Email validation regex (RFC 5322 simplified).
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
    )
    .expect("Invalid email regex")
});

/// Absolute http(s) URL.
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[-a-zA-Z0-9@:%._\+~#=]{1,256}(?::\d{1,5})?(?:[/?#][-a-zA-Z0-9()@:%_\+.~#?&/=]*)?$")
        .expect("Invalid URL regex")
});

// ═══════════════════════════════════════════════════════════════════════════════
// Validation Rule Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A validation rule that can be applied to a value.
pub trait ValidationRule<T: ?Sized> {
    /// Return a message describing why `value` is invalid, or `None`.
    fn check(&self, value: &T) -> Option<String>;
}

macro_rules! optional_rule {
    ($rule:ty, $inner:ty) => {
        impl ValidationRule<Option<$inner>> for $rule {
            fn check(&self, value: &Option<$inner>) -> Option<String> {
                value.as_ref().and_then(|v| <$rule as ValidationRule<$inner>>::check(self, v))
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// String Rules
// ═══════════════════════════════════════════════════════════════════════════════

/// Rule that rejects empty or whitespace-only strings.
#[derive(Debug, Clone, Default)]
pub struct Required;

impl ValidationRule<String> for Required {
    fn check(&self, value: &String) -> Option<String> {
        value.trim().is_empty().then(|| "field is required".to_string())
    }
}

/// Rule that validates string minimum length in characters.
#[derive(Debug, Clone)]
pub struct MinLength(pub usize);

impl ValidationRule<String> for MinLength {
    fn check(&self, value: &String) -> Option<String> {
        let len = value.chars().count();
        (len < self.0).then(|| format!("must be at least {} characters", self.0))
    }
}

optional_rule!(MinLength, String);

/// Rule that validates email format.
#[derive(Debug, Clone, Default)]
pub struct Email;

impl ValidationRule<String> for Email {
    fn check(&self, value: &String) -> Option<String> {
        (!EMAIL_REGEX.is_match(value)).then(|| "invalid email address".to_string())
    }
}

/// Rule that validates an absolute http(s) URL.
#[derive(Debug, Clone, Default)]
pub struct Url;

impl ValidationRule<String> for Url {
    fn check(&self, value: &String) -> Option<String> {
        (!URL_REGEX.is_match(value)).then(|| "invalid URL".to_string())
    }
}

optional_rule!(Url, String);

/// Rule that validates UUID format.
#[derive(Debug, Clone, Default)]
pub struct Uuid;

impl ValidationRule<String> for Uuid {
    fn check(&self, value: &String) -> Option<String> {
        uuid::Uuid::parse_str(value)
            .is_err()
            .then(|| "invalid UUID".to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Numeric Rules
// ═══════════════════════════════════════════════════════════════════════════════

/// Rule that validates a number is at least the given minimum.
#[derive(Debug, Clone)]
pub struct Min(pub f64);

impl ValidationRule<f64> for Min {
    fn check(&self, value: &f64) -> Option<String> {
        (value.is_nan() || *value < self.0).then(|| format!("must be at least {}", self.0))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Set Membership Rule
// ═══════════════════════════════════════════════════════════════════════════════

/// Rule that validates a value is in a predefined set.
#[derive(Debug, Clone)]
pub struct OneOf(pub &'static [&'static str]);

impl ValidationRule<String> for OneOf {
    fn check(&self, value: &String) -> Option<String> {
        (!self.0.contains(&value.as_str())).then(|| format!("must be one of: {}", self.0.join(", ")))
    }
}
