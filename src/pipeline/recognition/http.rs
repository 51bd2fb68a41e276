use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{RecognitionError, RecognitionProvider};
use crate::config::ProviderConfig;
use crate::models::{
    DocumentType, FaceMatchResult, LivenessCheck, LivenessResult, OcrResult, RawFieldBag,
};

/// HTTP/JSON client for the recognition provider.
///
/// Cheap to clone; clones share the connection pool and the session flag.
#[derive(Clone)]
pub struct HttpRecognitionClient {
    base_url: String,
    access_token: String,
    client: reqwest::Client,
    closed: Arc<AtomicBool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentRequest<'a> {
    document_type: &'a str,
    image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    back_image: Option<String>,
}

#[derive(Serialize)]
struct FaceCompareRequest {
    image1: String,
    image2: String,
}

#[derive(Serialize)]
struct LivenessRequest {
    image: String,
}

#[derive(Deserialize)]
struct FaceCompareResponse {
    #[serde(default)]
    matched: bool,
    #[serde(alias = "similarity")]
    confidence: f32,
}

#[derive(Deserialize)]
struct LivenessResponse {
    #[serde(alias = "live")]
    passed: bool,
    #[serde(default)]
    score: Option<f32>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    checks: std::collections::BTreeMap<String, LivenessCheck>,
}

impl HttpRecognitionClient {
    /// Build the client and perform one authenticated handshake.
    pub async fn connect(config: &ProviderConfig) -> Result<Self, RecognitionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RecognitionError::Rejected(format!("HTTP client setup failed: {e}")))?;

        let this = Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            client,
            closed: Arc::new(AtomicBool::new(false)),
        };

        let response = this
            .client
            .get(this.url("/api/health"))
            .bearer_auth(&this.access_token)
            .send()
            .await
            .map_err(send_error)?;
        check_status(response).await?;

        tracing::info!(base_url = %this.base_url, "Connected to recognition provider");
        Ok(this)
    }

    /// Close the session. Later calls on any clone fail with `Rejected`.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(base_url = %self.base_url, "Recognition provider session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, RecognitionError> {
        if self.is_closed() {
            return Err(RecognitionError::Rejected("provider session is closed".into()));
        }

        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(send_error)?;

        check_status(response)
            .await?
            .json::<R>()
            .await
            .map_err(|e| RecognitionError::Rejected(format!("malformed provider response: {e}")))
    }
}

#[async_trait]
impl RecognitionProvider for HttpRecognitionClient {
    async fn extract_document_fields(
        &self,
        document: &Path,
        document_back: Option<&Path>,
        document_type: &DocumentType,
    ) -> Result<OcrResult, RecognitionError> {
        let back_image = match document_back {
            Some(path) => Some(encode_image(path).await?),
            None => None,
        };
        let body = DocumentRequest {
            document_type: document_type.as_str(),
            image: encode_image(document).await?,
            back_image,
        };

        let raw: serde_json::Value = self.post("/api/idcard_recognition", &body).await?;
        Ok(OcrResult {
            fields: flatten_fields(&raw)?,
            raw,
        })
    }

    async fn compare_faces(
        &self,
        selfie: &Path,
        document: &Path,
    ) -> Result<FaceMatchResult, RecognitionError> {
        let body = FaceCompareRequest {
            image1: encode_image(selfie).await?,
            image2: encode_image(document).await?,
        };
        let response: FaceCompareResponse = self.post("/api/face_compare", &body).await?;
        Ok(FaceMatchResult {
            matched: response.matched,
            confidence: response.confidence,
        })
    }

    async fn assess_liveness(&self, selfie: &Path) -> Result<LivenessResult, RecognitionError> {
        let body = LivenessRequest {
            image: encode_image(selfie).await?,
        };
        let response: LivenessResponse = self.post("/api/face_liveness", &body).await?;
        Ok(LivenessResult {
            passed: response.passed,
            score: response.score,
            details: response.details.unwrap_or_default(),
            checks: response.checks,
        })
    }
}

async fn encode_image(path: &Path) -> Result<String, RecognitionError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        RecognitionError::Rejected(format!("cannot read image {}: {e}", path.display()))
    })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn send_error(e: reqwest::Error) -> RecognitionError {
    if e.is_connect() || e.is_timeout() || e.is_request() {
        RecognitionError::Unavailable(e.to_string())
    } else {
        RecognitionError::Rejected(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RecognitionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

/// 408, 429 and 5xx are transient; every other failure status is permanent.
fn classify_status(status: StatusCode, body: &str) -> RecognitionError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        RecognitionError::Unavailable(message)
    } else {
        RecognitionError::Rejected(message)
    }
}

/// Turn the provider's `fields` object into a flat string bag.
fn flatten_fields(raw: &serde_json::Value) -> Result<RawFieldBag, RecognitionError> {
    let fields = raw
        .get("fields")
        .and_then(|f| f.as_object())
        .ok_or_else(|| RecognitionError::Rejected("provider response has no fields object".into()))?;

    Ok(fields
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retryable_statuses_are_unavailable() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(classify_status(status, "").is_transient(), "{status}");
        }
    }

    #[test]
    fn client_errors_are_rejected() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            assert!(!classify_status(status, "").is_transient(), "{status}");
        }
        let err = classify_status(StatusCode::BAD_REQUEST, " no face found \n");
        assert_eq!(err, RecognitionError::Rejected("HTTP 400: no face found".into()));
    }

    #[test]
    fn fields_are_flattened_to_strings() {
        let raw = json!({
            "fields": {
                "name": "JOHN^DOE",
                "documentNumber": 123456,
                "address": null
            },
            "quality": 0.8
        });
        let fields = flatten_fields(&raw).unwrap();
        assert_eq!(fields["name"], "JOHN^DOE");
        assert_eq!(fields["documentNumber"], "123456");
        assert!(!fields.contains_key("address"));
    }

    #[test]
    fn missing_fields_object_is_rejected() {
        let err = flatten_fields(&json!({"status": "ok"})).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn face_response_accepts_similarity_alias() {
        let parsed: FaceCompareResponse =
            serde_json::from_value(json!({"similarity": 0.62})).unwrap();
        assert!(!parsed.matched);
        assert_eq!(parsed.confidence, 0.62);
    }

    #[tokio::test]
    async fn unreadable_image_is_rejected() {
        let err = encode_image(Path::new("/nonexistent/selfie.jpg")).await.unwrap_err();
        assert!(matches!(err, RecognitionError::Rejected(_)));
    }

    #[tokio::test]
    async fn closed_session_rejects_calls() {
        let client = HttpRecognitionClient {
            base_url: "http://127.0.0.1:9".into(),
            access_token: "t".into(),
            client: reqwest::Client::new(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let clone = client.clone();
        client.shutdown();
        assert!(clone.is_closed());

        let err = clone
            .post::<_, serde_json::Value>("/api/face_liveness", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, RecognitionError::Rejected("provider session is closed".into()));
    }
}
