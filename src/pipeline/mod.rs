pub mod schema;
pub mod sanitize;
pub mod matching;
pub mod recognition;
pub mod orchestrator;
pub mod worker;

pub use schema::*;
pub use sanitize::*;
pub use matching::*;
pub use orchestrator::*;
pub use worker::*;

use thiserror::Error;

/// Field-level failure while canonicalizing declared or extracted data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("Malformed field {field}: {reason}")]
    Malformed { field: String, reason: String },

    #[error("Unparseable date in field {field}: {value:?}")]
    DateParse { field: String, value: String },

    #[error("No field schema registered for document type {0}")]
    UnknownDocumentType(String),
}

impl FieldError {
    /// Date parse failures are a subset of malformed-field failures.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. } | Self::DateParse { .. })
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Malformed { field, .. } | Self::DateParse { field, .. } => Some(field),
            Self::UnknownDocumentType(_) => None,
        }
    }
}
