//! Request validation.
//!
//! Request payloads implement [`Validate`] by chaining rules per field:
//!
//! ```rust,ignore
//! use lumen_core::validation::{validate_field, validate_request, Email, MinLength, Validate};
//!
//! impl Validate for LoginRequest {
//!     fn validate(&self) -> ValidationResult<()> {
//!         validate_request()
//!             .field(validate_field("email", &self.email).rule(Email))
//!             .field(validate_field("password", &self.password).rule(MinLength(6)))
//!             .result()
//!     }
//! }
//! ```
//!
//! Failures surface to clients as a 400 whose details map each field path to
//! its messages.

pub mod error;
pub mod rules;
pub mod validator;

pub use error::{ValidationErrors, ValidationResult};
pub use rules::{Email, Min, MinLength, OneOf, Required, Url, Uuid, ValidationRule};
pub use validator::{FieldValidator, RequestValidator, Validate};

/// Start validating a single field.
pub fn validate_field<'a, T: ?Sized>(name: &'a str, value: &'a T) -> FieldValidator<'a, T> {
    FieldValidator::new(name, value)
}

/// Start validating a whole request.
pub fn validate_request() -> RequestValidator {
    RequestValidator::new()
}
