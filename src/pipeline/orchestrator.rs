//! Moderation orchestrator: one verification run for one Pending record.
//!
//! Flow:
//! 1. OCR, face comparison and liveness run concurrently; the join is a barrier
//! 2. Provider failures become error-log entries, never errors
//! 3. If OCR succeeded: sanitize both sides and compare field by field
//! 4. Verdict, then one terminal write
//!
//! Dropping the future before step 4 leaves the record Pending.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::matching::evaluate;
use super::recognition::{RecognitionAdapter, RecognitionFailure};
use super::sanitize::{sanitize_fields, FieldSource};
use super::schema::SchemaRegistry;
use super::FieldError;
use crate::db::ModerationStore;
use crate::error::ModerationError;
use crate::models::*;

pub struct ModerationOrchestrator {
    recognition: RecognitionAdapter,
    schemas: Arc<SchemaRegistry>,
    store: Arc<dyn ModerationStore>,
    face_match_threshold: f32,
}

impl ModerationOrchestrator {
    pub fn new(
        recognition: RecognitionAdapter,
        schemas: Arc<SchemaRegistry>,
        store: Arc<dyn ModerationStore>,
        face_match_threshold: f32,
    ) -> Self {
        Self {
            recognition,
            schemas,
            store,
            face_match_threshold,
        }
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    /// Evaluate and persist the terminal outcome for a Pending record. A
    /// record that is already terminal is rejected before any provider call.
    pub async fn run(
        &self,
        record: &ModerationRecord,
        claim: &IdentityClaim,
    ) -> Result<ModerationRecord, ModerationError> {
        let store = self.store.clone();
        let id = record.id.clone();
        let current = tokio::task::spawn_blocking(move || store.get(&id))
            .await??
            .ok_or_else(|| ModerationError::NotFound(record.id.clone()))?;
        if current.is_terminal() {
            return Err(ModerationError::AlreadyModerated {
                id: current.id,
                status: current.status,
            });
        }

        let outcome = self.evaluate(record, claim).await;

        let store = self.store.clone();
        let id = record.id.clone();
        let finalized = tokio::task::spawn_blocking(move || store.finalize(&id, &outcome)).await??;

        tracing::info!(
            moderation_id = %finalized.id,
            status = %finalized.status,
            errors = finalized.error_logs.len(),
            elapsed_ms = finalized.timings.map(|t| t.total_ms).unwrap_or_default(),
            "Moderation finished"
        );
        Ok(finalized)
    }

    /// Compute the outcome of a run without persisting it.
    pub async fn evaluate(&self, record: &ModerationRecord, claim: &IdentityClaim) -> ModerationOutcome {
        let started = Instant::now();
        let assets = &record.assets;

        let ((ocr, document_ms), (face, face_ms), (liveness, liveness_ms)) = tokio::join!(
            timed(self.recognition.extract_document_fields(
                &assets.document,
                assets.document_back.as_deref(),
                &claim.document_type,
            )),
            timed(self.recognition.compare_faces(&assets.selfie, &assets.document)),
            timed(self.recognition.assess_liveness(&assets.selfie)),
        );

        let mut errors = Vec::new();
        capture(&mut errors, ModerationStage::DocumentExtraction, &ocr);
        capture(&mut errors, ModerationStage::FaceComparison, &face);
        capture(&mut errors, ModerationStage::Liveness, &liveness);

        let id_recog_data = ocr
            .ok()
            .map(|ocr| self.compare_fields(claim, ocr, &mut errors));
        let face_recog_data = face.ok();
        let face_live_data = liveness.ok();

        if let Some(face) = &face_recog_data {
            if face.confidence < self.face_match_threshold {
                errors.push(ErrorLogEntry::new(
                    ModerationStage::FaceThreshold,
                    ErrorKind::CheckFailed,
                    format!(
                        "face confidence {:.2} below threshold {:.2}",
                        face.confidence, self.face_match_threshold
                    ),
                ));
            }
        }

        if let Some(live) = face_live_data.as_ref().filter(|l| !l.passed) {
            let failed = live.failed_checks();
            let message = if failed.is_empty() {
                format!("liveness check failed: {}", live.details)
            } else {
                format!("liveness check failed ({}): {}", failed.join(", "), live.details)
            };
            errors.push(ErrorLogEntry::new(
                ModerationStage::LivenessCheck,
                ErrorKind::CheckFailed,
                message.trim_end_matches([':', ' ']).to_string(),
            ));
        }

        let passed = id_recog_data.as_ref().is_some_and(|d| d.ocr_match)
            && face_recog_data
                .as_ref()
                .is_some_and(|f| f.confidence >= self.face_match_threshold)
            && face_live_data.as_ref().is_some_and(|l| l.passed);

        let status = if passed {
            ModerationStatus::Completed
        } else {
            ModerationStatus::Failed
        };

        for entry in &errors {
            tracing::debug!(moderation_id = %record.id, stage = %entry.stage, kind = %entry.kind, "{}", entry.message);
        }

        ModerationOutcome {
            status,
            id_recog_data,
            face_recog_data,
            face_live_data,
            error_logs: errors,
            timings: StageTimings {
                document_ms,
                face_ms,
                liveness_ms,
                total_ms: elapsed_ms(started),
            },
        }
    }

    /// Sanitize declared and extracted data and compare them. Sanitizer
    /// failures force a mismatch.
    fn compare_fields(
        &self,
        claim: &IdentityClaim,
        ocr: OcrResult,
        errors: &mut Vec<ErrorLogEntry>,
    ) -> DocumentRecognitionData {
        let mut data = DocumentRecognitionData {
            document_type: claim.document_type.clone(),
            ocr,
            ocr_match: false,
            ocr_mismatch_details: Default::default(),
        };

        let schema = match self.schemas.get(&claim.document_type) {
            Ok(schema) => schema,
            Err(e) => {
                errors.push(field_error_entry("declared", &e));
                return data;
            }
        };

        let declared = sanitize_fields(schema, &claim.raw_fields(), FieldSource::Declared)
            .map_err(|e| errors.push(field_error_entry("declared", &e)));
        let extracted = sanitize_fields(schema, &data.ocr.fields, FieldSource::Extracted)
            .map_err(|e| errors.push(field_error_entry("extracted", &e)));

        let (Ok(declared), Ok(extracted)) = (declared, extracted) else {
            return data;
        };

        let report = evaluate(schema, &declared, &extracted);
        for field in report.mismatched_fields() {
            errors.push(ErrorLogEntry::new(
                ModerationStage::FieldMatch,
                ErrorKind::CheckFailed,
                format!("{field} does not match the declared value"),
            ));
        }
        data.ocr_match = report.ocr_match;
        data.ocr_mismatch_details = report.mismatches;
        data
    }
}

async fn timed<F: Future>(fut: F) -> (F::Output, u64) {
    let started = Instant::now();
    let output = fut.await;
    (output, elapsed_ms(started))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn capture<T>(errors: &mut Vec<ErrorLogEntry>, stage: ModerationStage, result: &Result<T, RecognitionFailure>) {
    if let Err(failure) = result {
        errors.push(ErrorLogEntry::new(stage, failure.error_kind(), failure.to_string()));
    }
}

/// Error-log entry for a sanitizer failure. Names the field, never its value.
fn field_error_entry(side: &str, err: &FieldError) -> ErrorLogEntry {
    let message = match err {
        FieldError::Malformed { field, .. } => format!("{side} field {field} is missing or blank"),
        FieldError::DateParse { field, .. } => format!("{side} field {field} is not a recognizable date"),
        FieldError::UnknownDocumentType(_) => err.to_string(),
    };
    ErrorLogEntry::new(ModerationStage::FieldSanitization, ErrorKind::Terminal, message)
}
