use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Image types accepted for selfie and document uploads.
const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/heic"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssetError {
    #[error("{role} image not found at {path}")]
    Missing { role: &'static str, path: PathBuf },

    #[error("{role} image has unsupported type {mime} (accepted: JPEG, PNG, WebP, HEIC)")]
    UnsupportedType { role: &'static str, mime: String },

    #[error("Asset pair id must not be empty")]
    EmptyId,
}

/// Stored images for one verification attempt. Referenced by a
/// moderation record, never owned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPair {
    /// Upload identifier; at most one live moderation per asset pair.
    pub id: String,
    pub selfie: PathBuf,
    pub document: PathBuf,
    #[serde(default)]
    pub document_back: Option<PathBuf>,
}

impl AssetPair {
    pub fn new(id: impl Into<String>, selfie: impl Into<PathBuf>, document: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            selfie: selfie.into(),
            document: document.into(),
            document_back: None,
        }
    }

    pub fn with_document_back(mut self, back: impl Into<PathBuf>) -> Self {
        self.document_back = Some(back.into());
        self
    }

    /// Check every referenced image exists and is an accepted image type.
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.id.trim().is_empty() {
            return Err(AssetError::EmptyId);
        }
        check_image("selfie", &self.selfie)?;
        check_image("document", &self.document)?;
        if let Some(back) = &self.document_back {
            check_image("document back", back)?;
        }
        Ok(())
    }
}

fn check_image(role: &'static str, path: &Path) -> Result<(), AssetError> {
    if !path.is_file() {
        return Err(AssetError::Missing {
            role,
            path: path.to_path_buf(),
        });
    }
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let essence = mime.essence_str();
    if !ACCEPTED_MIME_TYPES.contains(&essence) {
        return Err(AssetError::UnsupportedType {
            role,
            mime: essence.to_string(),
        });
    }
    Ok(())
}
