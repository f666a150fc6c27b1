//! OpenAI Whisper STT provider: a single-shot multipart POST, no polling.
//!
//! Grounded on `core/stt/openai/client.rs`'s use of `reqwest::multipart`
//! to ship audio bytes as a named file part with a `model`/`language` form
//! alongside it; simplified to one request/response round trip since this
//! contract has no streaming concept.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::{debug, warn};

use super::backend_format::BackendTranscription;
use super::{AudioPayload, SttHealth, SttProvider, SttResult, TranscribeCtx};
use crate::config::OpenAiSttConfig;
use crate::errors::{AppError, ErrorCode};
use crate::ids::ProviderId;

pub struct OpenAiSttProvider {
    config: OpenAiSttConfig,
    http: reqwest::Client,
}

impl OpenAiSttProvider {
    pub fn new(config: OpenAiSttConfig) -> Result<Self, AppError> {
        if config.api_key.is_empty() {
            return Err(AppError::operator(
                ErrorCode::MissingConfig,
                "openai STT provider is not configured",
                "openai.apiKey is empty",
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                AppError::operator(
                    ErrorCode::SttUnavailable,
                    "failed to build STT HTTP client",
                    e.to_string(),
                )
            })?;
        Ok(OpenAiSttProvider { config, http })
    }
}

#[async_trait]
impl SttProvider for OpenAiSttProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Openai
    }

    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio: AudioPayload, ctx: TranscribeCtx) -> Result<SttResult, AppError> {
        let started = Instant::now();

        let file_part = Part::bytes(audio.bytes.to_vec())
            .file_name("audio")
            .mime_str(&audio.content_type)
            .map_err(|e| {
                AppError::operator(ErrorCode::SttUnavailable, "invalid audio mime type", e.to_string())
            })?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone());

        let language = ctx
            .language_hint
            .clone()
            .unwrap_or_else(|| self.config.language.clone());
        if !language.is_empty() {
            form = form.text("language", language.clone());
        }

        let request = self
            .http
            .post(&self.config.base_url)
            .bearer_auth(self.config.api_key.expose())
            .multipart(form);

        let response = tokio::select! {
            result = request.send() => result,
            _ = ctx.cancellation.cancelled() => {
                debug!(turn_id = %ctx.turn_id, "openai STT call cancelled");
                return Err(AppError::user(ErrorCode::SttTimeout, "transcription cancelled"));
            }
            _ = tokio::time::sleep(Duration::from_millis(self.config.timeout_ms)) => {
                return Err(AppError::user(ErrorCode::SttTimeout, "transcription timed out"));
            }
        };

        let response = response.map_err(|e| {
            warn!(turn_id = %ctx.turn_id, error = %e, "openai STT request failed");
            AppError::operator(ErrorCode::SttUnavailable, "openai STT backend unreachable", e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::operator(ErrorCode::SttUnavailable, "failed to read openai STT response", e.to_string())
        })?;

        if !status.is_success() {
            return Err(AppError::operator(
                ErrorCode::SttTranscriptionFailed,
                "STT transcription failed",
                format!("openai STT returned {status}: {body}"),
            ));
        }

        let parsed: BackendTranscription = serde_json::from_str(&body).map_err(|e| {
            AppError::operator(
                ErrorCode::SttTranscriptionFailed,
                "STT transcription failed",
                format!("malformed openai STT response: {e}"),
            )
        })?;

        let text = parsed.normalize()?;

        Ok(SttResult {
            text,
            language: parsed.language.unwrap_or(language),
            confidence: parsed.confidence,
            provider_id: ProviderId::Openai,
            model: Some(self.config.model.clone()),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> SttHealth {
        let started = Instant::now();
        match self.http.get(&self.config.base_url).send().await {
            Ok(resp) => SttHealth {
                healthy: resp.status().is_success() || resp.status().as_u16() == 405,
                message: format!("reachable, status {}", resp.status()),
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => SttHealth {
                healthy: false,
                message: format!("unreachable: {e}"),
                latency_ms: started.elapsed().as_millis() as u64,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> OpenAiSttConfig {
        OpenAiSttConfig {
            base_url: "http://127.0.0.1:1/v1/audio/transcriptions".to_string(),
            api_key: crate::secret::Secret::new("sk-test"),
            model: "whisper-1".to_string(),
            language: "en".to_string(),
            timeout_ms: 5_000,
            field_mappings: None,
        }
    }

    #[test]
    fn rejects_missing_api_key() {
        let mut c = cfg();
        c.api_key = crate::secret::Secret::new("");
        let err = OpenAiSttProvider::new(c).unwrap_err();
        assert_eq!(err.code().as_str(), "MISSING_CONFIG");
    }

    #[test]
    fn provider_id_and_name_are_stable() {
        let provider = OpenAiSttProvider::new(cfg()).unwrap();
        assert_eq!(provider.provider_id(), ProviderId::Openai);
        assert_eq!(provider.name(), "openai");
    }
}
