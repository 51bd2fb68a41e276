//! Errors surfaced to callers of the moderation service.
//!
//! Only pre-flight and lookup failures live here. Provider, sanitizer and
//! match failures are captured inside the pipeline and recorded on the
//! moderation record instead.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::{AssetError, ModerationId, ModerationStatus};

#[derive(Error, Debug)]
pub enum ModerationError {
    #[error("Moderation {existing} is already {status} for asset pair {asset_pair_id}")]
    DuplicateModeration {
        asset_pair_id: String,
        existing: ModerationId,
        status: ModerationStatus,
    },

    #[error("Moderation {id} already reached terminal status {status}")]
    AlreadyModerated {
        id: ModerationId,
        status: ModerationStatus,
    },

    #[error("Identity claim not found: {0}")]
    ClaimNotFound(String),

    #[error("Moderation record not found: {0}")]
    NotFound(ModerationId),

    #[error("Invalid asset: {0}")]
    InvalidAsset(#[from] AssetError),

    #[error("No field schema registered for document type {0}")]
    UnsupportedDocumentType(String),

    #[error("Moderation queue is closed")]
    QueueClosed,

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ModerationError {
    fn from(e: tokio::task::JoinError) -> Self {
        ModerationError::Internal(format!("blocking task failed: {e}"))
    }
}
