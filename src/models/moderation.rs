use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::asset::AssetPair;
use super::claim::DocumentType;
use super::enums::{ErrorKind, ModerationStage, ModerationStatus};
use super::recognition::{FaceMatchResult, LivenessResult, OcrResult};

pub type ModerationId = String;

/// Generate a new moderation record id (`mod-<uuid>`).
pub fn new_moderation_id() -> ModerationId {
    format!("mod-{}", Uuid::new_v4())
}

/// One verification attempt: inputs, per-check results, error log, verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRecord {
    pub id: ModerationId,
    pub claim_id: String,
    pub assets: AssetPair,
    /// Previous record this re-evaluation replaces.
    pub supersedes: Option<ModerationId>,
    pub id_recog_data: Option<DocumentRecognitionData>,
    pub face_recog_data: Option<FaceMatchResult>,
    pub face_live_data: Option<LivenessResult>,
    pub error_logs: Vec<ErrorLogEntry>,
    pub timings: Option<StageTimings>,
    pub status: ModerationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModerationRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error-log entries for one stage.
    pub fn errors_for(&self, stage: ModerationStage) -> impl Iterator<Item = &ErrorLogEntry> {
        self.error_logs.iter().filter(move |e| e.stage == stage)
    }
}

/// Document recognition result with the declared-vs-extracted comparison
/// folded in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecognitionData {
    pub document_type: DocumentType,
    pub ocr: OcrResult,
    /// False when any field differs or sanitization failed.
    pub ocr_match: bool,
    /// Mismatched fields only.
    #[serde(default)]
    pub ocr_mismatch_details: BTreeMap<String, FieldMismatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMismatch {
    pub declared_value: String,
    pub extracted_value: String,
    pub is_match: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub stage: ModerationStage,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorLogEntry {
    pub fn new(stage: ModerationStage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorLogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.stage, self.kind, self.message)
    }
}

/// Wall-clock time spent per recognition call and for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTimings {
    pub document_ms: u64,
    pub face_ms: u64,
    pub liveness_ms: u64,
    pub total_ms: u64,
}

/// Seed for a new Pending record.
#[derive(Debug, Clone)]
pub struct NewModeration {
    pub id: ModerationId,
    pub claim_id: String,
    pub assets: AssetPair,
    pub supersedes: Option<ModerationId>,
}

impl NewModeration {
    pub fn new(claim_id: impl Into<String>, assets: AssetPair) -> Self {
        Self {
            id: new_moderation_id(),
            claim_id: claim_id.into(),
            assets,
            supersedes: None,
        }
    }

    pub fn superseding(mut self, previous: impl Into<ModerationId>) -> Self {
        self.supersedes = Some(previous.into());
        self
    }
}

/// Everything the single terminal write stores.
#[derive(Debug, Clone, PartialEq)]
pub struct ModerationOutcome {
    pub status: ModerationStatus,
    pub id_recog_data: Option<DocumentRecognitionData>,
    pub face_recog_data: Option<FaceMatchResult>,
    pub face_live_data: Option<LivenessResult>,
    pub error_logs: Vec<ErrorLogEntry>,
    pub timings: StageTimings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_ids_are_prefixed_and_unique() {
        let a = new_moderation_id();
        let b = new_moderation_id();
        assert!(a.starts_with("mod-"));
        assert_ne!(a, b);
    }

    #[test]
    fn error_entry_display_names_stage_and_kind() {
        let entry = ErrorLogEntry::new(
            ModerationStage::DocumentExtraction,
            ErrorKind::TransientExhausted,
            "provider unavailable after 3 attempts",
        );
        assert_eq!(
            entry.to_string(),
            "[document_extraction/transient_exhausted] provider unavailable after 3 attempts"
        );
    }

    #[test]
    fn superseding_links_previous_record() {
        let seed = NewModeration::new("kyc-1", AssetPair::new("up-1", "s.jpg", "d.jpg"))
            .superseding("mod-old");
        assert_eq!(seed.supersedes.as_deref(), Some("mod-old"));
        assert_ne!(seed.id, "mod-old");
    }
}
