//! Provider-shaped recognition results, persisted as-is on the moderation record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::RawFieldBag;

/// Document OCR output: flat field bag plus the provider payload for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub fields: RawFieldBag,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceMatchResult {
    /// Provider's own decision; the verdict uses `confidence` against the
    /// configured threshold.
    pub matched: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessCheck {
    pub passed: bool,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessResult {
    pub passed: bool,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub details: String,
    /// Per-signal sub-results (sharpness, symmetry, texture, moire, depth,
    /// edgeNoise, blink, size) when the provider reports them.
    #[serde(default)]
    pub checks: BTreeMap<String, LivenessCheck>,
}

impl LivenessResult {
    /// Names of sub-checks that did not pass.
    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, c)| !c.passed)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
