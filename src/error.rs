use std::fmt;

use thiserror::Error;

/// A single rejected form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum DeskError {
    /// One or more fields failed validation. Nothing was changed.
    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A matching task already exists for this student or doubt.
    #[error("duplicate task detected: {0}")]
    DuplicateTask(String),

    #[error("student '{0}' must be archived before it can be deleted")]
    StudentNotArchived(String),

    #[error("doubt '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("could not read curriculum: {0}")]
    Curriculum(String),
}

impl DeskError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        DeskError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Field errors carried by a validation failure, empty otherwise.
    #[cfg(test)]
    pub fn fields(&self) -> &[FieldError] {
        match self {
            DeskError::Validation(fields) => fields,
            _ => &[],
        }
    }
}

pub type DeskResult<T> = Result<T, DeskError>;
