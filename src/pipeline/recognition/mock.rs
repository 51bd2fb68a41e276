use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{RecognitionError, RecognitionProvider};
use crate::models::{DocumentType, FaceMatchResult, LivenessResult, OcrResult, RawFieldBag};

type Reply<T> = Result<T, RecognitionError>;

/// Scripted responses for one provider operation: queued replies first,
/// then the fallback for every call after the queue drains.
struct Script<T> {
    queue: Mutex<VecDeque<Reply<T>>>,
    fallback: Mutex<Reply<T>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new(fallback: Reply<T>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    fn next(&self) -> Reply<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.queue).pop_front() {
            Some(reply) => reply,
            None => lock(&self.fallback).clone(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process recognition provider for tests and local runs.
///
/// Every operation succeeds by default (empty OCR bag, strong face match,
/// live selfie).
pub struct MockRecognitionProvider {
    ocr: Script<OcrResult>,
    face: Script<FaceMatchResult>,
    liveness: Script<LivenessResult>,
    delay: Option<Duration>,
}

impl MockRecognitionProvider {
    pub fn new() -> Self {
        Self {
            ocr: Script::new(Ok(OcrResult {
                fields: RawFieldBag::new(),
                raw: serde_json::Value::Null,
            })),
            face: Script::new(Ok(FaceMatchResult {
                matched: true,
                confidence: 0.95,
            })),
            liveness: Script::new(Ok(LivenessResult {
                passed: true,
                score: Some(0.98),
                details: "live".into(),
                checks: BTreeMap::new(),
            })),
            delay: None,
        }
    }

    /// Sleep this long before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fallback OCR reply built from a field bag.
    pub fn with_ocr_fields(self, fields: RawFieldBag) -> Self {
        self.set_ocr_fallback(Ok(OcrResult {
            raw: serde_json::to_value(&fields).unwrap_or_default(),
            fields,
        }));
        self
    }

    pub fn push_ocr(&self, reply: Reply<OcrResult>) {
        lock(&self.ocr.queue).push_back(reply);
    }

    pub fn push_face(&self, reply: Reply<FaceMatchResult>) {
        lock(&self.face.queue).push_back(reply);
    }

    pub fn push_liveness(&self, reply: Reply<LivenessResult>) {
        lock(&self.liveness.queue).push_back(reply);
    }

    pub fn set_ocr_fallback(&self, reply: Reply<OcrResult>) {
        *lock(&self.ocr.fallback) = reply;
    }

    pub fn set_face_fallback(&self, reply: Reply<FaceMatchResult>) {
        *lock(&self.face.fallback) = reply;
    }

    pub fn set_liveness_fallback(&self, reply: Reply<LivenessResult>) {
        *lock(&self.liveness.fallback) = reply;
    }

    pub fn ocr_calls(&self) -> usize {
        self.ocr.calls.load(Ordering::SeqCst)
    }

    pub fn face_calls(&self) -> usize {
        self.face.calls.load(Ordering::SeqCst)
    }

    pub fn liveness_calls(&self) -> usize {
        self.liveness.calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockRecognitionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecognitionProvider for MockRecognitionProvider {
    async fn extract_document_fields(
        &self,
        _document: &Path,
        _document_back: Option<&Path>,
        _document_type: &DocumentType,
    ) -> Result<OcrResult, RecognitionError> {
        self.pause().await;
        self.ocr.next()
    }

    async fn compare_faces(
        &self,
        _selfie: &Path,
        _document: &Path,
    ) -> Result<FaceMatchResult, RecognitionError> {
        self.pause().await;
        self.face.next()
    }

    async fn assess_liveness(&self, _selfie: &Path) -> Result<LivenessResult, RecognitionError> {
        self.pause().await;
        self.liveness.next()
    }
}
