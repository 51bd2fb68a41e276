use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use super::{RecognitionError, RecognitionFailure, RecognitionProvider};
use crate::config::RetryPolicy;
use crate::models::{DocumentType, FaceMatchResult, LivenessResult, OcrResult};

/// Retrying, deadline-bounded front for a recognition provider.
///
/// Stateless apart from the shared provider handle; clone freely.
#[derive(Clone)]
pub struct RecognitionAdapter {
    provider: Arc<dyn RecognitionProvider>,
    policy: RetryPolicy,
}

impl RecognitionAdapter {
    pub fn new(provider: Arc<dyn RecognitionProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn extract_document_fields(
        &self,
        document: &Path,
        document_back: Option<&Path>,
        document_type: &DocumentType,
    ) -> Result<OcrResult, RecognitionFailure> {
        self.call_with_retry("document_extraction", || {
            self.provider
                .extract_document_fields(document, document_back, document_type)
        })
        .await
    }

    pub async fn compare_faces(
        &self,
        selfie: &Path,
        document: &Path,
    ) -> Result<FaceMatchResult, RecognitionFailure> {
        self.call_with_retry("face_comparison", || self.provider.compare_faces(selfie, document))
            .await
    }

    pub async fn assess_liveness(&self, selfie: &Path) -> Result<LivenessResult, RecognitionFailure> {
        self.call_with_retry("liveness", || self.provider.assess_liveness(selfie))
            .await
    }

    /// Run `call` until it succeeds, is rejected, or the attempt budget is spent.
    ///
    /// Each attempt gets its own deadline; hitting it counts as `Unavailable`.
    async fn call_with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<T, RecognitionFailure>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RecognitionError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(RecognitionError::Unavailable(format!(
                    "no response within {}ms",
                    self.policy.call_timeout.as_millis()
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(RecognitionError::Rejected(message)) => {
                    tracing::warn!(operation, attempt, error = %message, "Recognition call rejected");
                    return Err(RecognitionFailure::Rejected { message });
                }
                Err(RecognitionError::Unavailable(message)) if attempt < max_attempts => {
                    let delay = self.policy.delay_after(attempt);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Recognition provider unavailable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(RecognitionError::Unavailable(message)) => {
                    tracing::warn!(operation, attempts = attempt, error = %message, "Recognition retries exhausted");
                    return Err(RecognitionFailure::Exhausted {
                        attempts: attempt,
                        last_error: message,
                    });
                }
            }
        }
    }
}
