//! Custom STT provider: a single-shot multipart POST against an
//! operator-supplied endpoint and auth header, for backends that speak the
//! same opaque transcription shape but aren't OpenAI or WhisperX.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::warn;

use super::backend_format::BackendTranscription;
use super::{AudioPayload, SttHealth, SttProvider, SttResult, TranscribeCtx};
use crate::config::CustomSttConfig;
use crate::errors::{AppError, ErrorCode};
use crate::ids::ProviderId;

pub struct CustomSttProvider {
    config: CustomSttConfig,
    http: reqwest::Client,
}

impl CustomSttProvider {
    pub fn new(config: CustomSttConfig) -> Result<Self, AppError> {
        if config.auth_header.is_empty() {
            return Err(AppError::operator(
                ErrorCode::MissingConfig,
                "custom STT provider is not configured",
                "custom.authHeader is empty",
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
        Ok(CustomSttProvider { config, http })
    }
}

#[async_trait]
impl SttProvider for CustomSttProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Custom
    }

    fn name(&self) -> &str {
        "custom"
    }

    async fn transcribe(&self, audio: AudioPayload, ctx: TranscribeCtx) -> Result<SttResult, AppError> {
        let started = Instant::now();

        let file_part = Part::bytes(audio.bytes.to_vec())
            .file_name("audio")
            .mime_str(&audio.content_type)
            .map_err(|e| {
                AppError::operator(ErrorCode::SttUnavailable, "invalid audio mime type", e.to_string())
            })?;

        let language = ctx
            .language_hint
            .clone()
            .unwrap_or_else(|| self.config.language.clone());

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone());
        if !language.is_empty() {
            form = form.text("language", language.clone());
        }

        let request = self
            .http
            .post(&self.config.url)
            .header("Authorization", self.config.auth_header.expose())
            .multipart(form);

        let response = tokio::select! {
            result = request.send() => result,
            _ = ctx.cancellation.cancelled() => {
                return Err(AppError::user(ErrorCode::SttTimeout, "transcription cancelled"));
            }
        };

        let response = response.map_err(|e| {
            warn!(turn_id = %ctx.turn_id, error = %e, "custom STT request failed");
            AppError::operator(ErrorCode::SttUnavailable, "custom STT backend unreachable", e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::operator(ErrorCode::SttUnavailable, "failed to read custom STT response", e.to_string())
        })?;

        if !status.is_success() {
            return Err(AppError::operator(
                ErrorCode::SttTranscriptionFailed,
                "STT transcription failed",
                format!("custom STT returned {status}: {body}"),
            ));
        }

        let parsed: BackendTranscription = serde_json::from_str(&body).map_err(|e| {
            AppError::operator(
                ErrorCode::SttTranscriptionFailed,
                "STT transcription failed",
                format!("malformed custom STT response: {e}"),
            )
        })?;

        let text = parsed.normalize()?;

        Ok(SttResult {
            text,
            language: parsed.language.unwrap_or(language),
            confidence: parsed.confidence,
            provider_id: ProviderId::Custom,
            model: Some(self.config.model.clone()),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> SttHealth {
        let started = Instant::now();
        match self.http.get(&self.config.url).send().await {
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

    fn cfg() -> CustomSttConfig {
        CustomSttConfig {
            url: "http://127.0.0.1:1/transcribe".to_string(),
            auth_header: crate::secret::Secret::new("Bearer test"),
            model: "custom".to_string(),
            language: "en".to_string(),
            timeout_ms: 5_000,
            poll_interval_ms: 500,
            field_mappings: None,
        }
    }

    #[test]
    fn rejects_missing_auth_header() {
        let mut c = cfg();
        c.auth_header = crate::secret::Secret::new("");
        let err = CustomSttProvider::new(c).unwrap_err();
        assert_eq!(err.code().as_str(), "MISSING_CONFIG");
    }

    #[test]
    fn provider_id_and_name_are_stable() {
        let provider = CustomSttProvider::new(cfg()).unwrap();
        assert_eq!(provider.provider_id(), ProviderId::Custom);
        assert_eq!(provider.name(), "custom");
    }
}
