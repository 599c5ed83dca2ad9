//! Validation errors raised while constructing device records

use thiserror::Error;

use crate::args::ArgKind;
use crate::descriptor::Variant;

/// The reasons a device or template argument set is rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("PORT must be a non-empty string")]
    EmptyPort,
    #[error("PORT '{0}' contains characters that cannot appear in a startup script argument")]
    InvalidPort(String),
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be an integer, got '{value}'")]
    NotAnInteger { field: &'static str, value: String },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },
    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("{field} must be {expected}")]
    WrongType { field: &'static str, expected: ArgKind },
    #[error("Missing required argument {0}")]
    MissingArgument(&'static str),
    #[error("Unknown argument {0} for the {1} variant")]
    UnknownArgument(String, Variant),
    #[error("Unknown variant '{0}', expected 'simple' or 'extended'")]
    UnknownVariant(String),
}
