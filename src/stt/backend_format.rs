//! The shared backend response shape and the normalization law (spec §4.2):
//! "if the backend returns segmented output, join segment texts with a
//! single space and use the result; otherwise fall back to the backend's
//! top-level text field; if both are empty, raise `STT_TRANSCRIPTION_FAILED`
//! (user kind)." Every provider deserializes its own backend's JSON into
//! this shape before calling `normalize_transcript`, so the law is applied
//! identically regardless of which backend answered.

use serde::Deserialize;

use crate::errors::{AppError, ErrorCode};

#[derive(Debug, Clone, Deserialize)]
pub struct BackendSegment {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendTranscription {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<BackendSegment>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Applies the normalization law to already-extracted segment texts and a
/// top-level text field. Kept free of `BackendTranscription` so the
/// contract test can exercise it directly against hand-built inputs.
pub fn normalize_transcript(segment_texts: &[String], top_level_text: &str) -> Result<String, AppError> {
    if !segment_texts.is_empty() {
        let joined = segment_texts
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return Ok(joined);
        }
    }

    let trimmed = top_level_text.trim();
    if !trimmed.is_empty() {
        return Ok(trimmed.to_string());
    }

    Err(AppError::user(
        ErrorCode::SttTranscriptionFailed,
        "transcription produced no text",
    ))
}

impl BackendTranscription {
    pub fn normalize(&self) -> Result<String, AppError> {
        let segment_texts: Vec<String> = self.segments.iter().map(|s| s.text.clone()).collect();
        normalize_transcript(&segment_texts, &self.text)
    }
}
