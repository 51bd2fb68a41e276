//! Recognition provider boundary: document OCR, face comparison, liveness.
//!
//! `RecognitionProvider` is one round trip per call. `RecognitionAdapter`
//! adds per-attempt deadlines and bounded retries on top of any provider.

pub mod adapter;
pub mod http;
pub mod mock;

pub use adapter::RecognitionAdapter;
pub use http::HttpRecognitionClient;
pub use mock::MockRecognitionProvider;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DocumentType, ErrorKind, FaceMatchResult, LivenessResult, OcrResult};

/// Failure of a single provider round trip.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    /// Connect error, timeout, HTTP 408/429/5xx. Worth retrying.
    #[error("Recognition provider unavailable: {0}")]
    Unavailable(String),

    /// Bad input, unreadable image, malformed response, closed session.
    #[error("Recognition provider rejected the request: {0}")]
    Rejected(String),
}

impl RecognitionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Final outcome of a call after the retry policy has run its course.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionFailure {
    #[error("{message}")]
    Rejected { message: String },

    #[error("gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

impl RecognitionFailure {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::Rejected { .. } => ErrorKind::Terminal,
            Self::Exhausted { .. } => ErrorKind::TransientExhausted,
        }
    }
}

#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    async fn extract_document_fields(
        &self,
        document: &Path,
        document_back: Option<&Path>,
        document_type: &DocumentType,
    ) -> Result<OcrResult, RecognitionError>;

    async fn compare_faces(
        &self,
        selfie: &Path,
        document: &Path,
    ) -> Result<FaceMatchResult, RecognitionError>;

    async fn assess_liveness(&self, selfie: &Path) -> Result<LivenessResult, RecognitionError>;
}
