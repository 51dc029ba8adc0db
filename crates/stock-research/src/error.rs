//! Error types for stock research operations

use serde::Serialize;
use thiserror::Error;

/// A single rejected request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the offending field
    pub field: String,
    /// Why the value was rejected
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

/// Errors that stop a research request
///
/// Provider failures never show up here: the router turns them into
/// diagnostics. Only request validation and setup problems surface.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// Request arguments were rejected before any provider call
    #[error("Invalid request: {}", format_fields(.fields))]
    Validation {
        fields: Vec<FieldError>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ResearchError {
    /// Fields rejected by validation, empty for other variants
    pub fn fields(&self) -> &[FieldError] {
        match self {
            Self::Validation { fields } => fields,
            _ => &[],
        }
    }
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{} ({})", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for research operations
pub type Result<T> = std::result::Result<T, ResearchError>;
