//! WhisperX STT provider: submits a transcription job, then polls the job
//! endpoint at `pollIntervalMs` until the backend reports completion,
//! following the pattern of an adapter owning its own internal retry/poll
//! loop (spec §7: "retries... at STT provider polling, where applicable,
//! by the adapter's own internal loop").

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use super::backend_format::BackendTranscription;
use super::{AudioPayload, SttHealth, SttProvider, SttResult, TranscribeCtx};
use crate::config::WhisperXConfig;
use crate::errors::{AppError, ErrorCode};
use crate::ids::ProviderId;

#[derive(Debug, Deserialize)]
struct JobSubmitResponse {
    #[serde(alias = "job_id", alias = "id")]
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum JobStatusResponse {
    Completed {
        #[serde(flatten)]
        result: BackendTranscription,
    },
    Failed {
        #[serde(default)]
        error: String,
    },
    Processing,
    Pending,
}

pub struct WhisperXProvider {
    config: WhisperXConfig,
    http: reqwest::Client,
}

impl WhisperXProvider {
    pub fn new(config: WhisperXConfig) -> Result<Self, AppError> {
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
        Ok(WhisperXProvider { config, http })
    }

    fn job_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{job_id}", self.config.base_url.trim_end_matches('/'))
    }

    async fn submit_job(&self, audio: &AudioPayload, language: &str) -> Result<String, AppError> {
        let file_part = Part::bytes(audio.bytes.to_vec())
            .file_name("audio")
            .mime_str(&audio.content_type)
            .map_err(|e| {
                AppError::operator(ErrorCode::SttUnavailable, "invalid audio mime type", e.to_string())
            })?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.config.model.clone());
        if !language.is_empty() {
            form = form.text("language", language.to_string());
        }

        let mut request = self.http.post(&self.config.base_url).multipart(form);
        if let Some(ref header) = self.config.auth_header {
            request = request.header("Authorization", header.clone());
        }

        let response = request.send().await.map_err(|e| {
            AppError::operator(ErrorCode::SttUnavailable, "whisperx backend unreachable", e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::operator(
                ErrorCode::SttTranscriptionFailed,
                "STT transcription failed",
                format!("whisperx job submission returned {status}: {body}"),
            ));
        }

        let parsed: JobSubmitResponse = response.json().await.map_err(|e| {
            AppError::operator(
                ErrorCode::SttTranscriptionFailed,
                "STT transcription failed",
                format!("malformed whisperx job-submit response: {e}"),
            )
        })?;

        Ok(parsed.job_id)
    }

    async fn poll_job(&self, job_id: &str, ctx: &TranscribeCtx) -> Result<BackendTranscription, AppError> {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.timeout_ms);
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));

        loop {
            tokio::select! {
                _ = ctx.cancellation.cancelled() => {
                    debug!(turn_id = %ctx.turn_id, "whisperx poll cancelled");
                    return Err(AppError::user(ErrorCode::SttTimeout, "transcription cancelled"));
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(AppError::user(ErrorCode::SttTimeout, "transcription timed out"));
                }
                _ = interval.tick() => {
                    let response = self.http.get(self.job_url(job_id)).send().await.map_err(|e| {
                        AppError::operator(ErrorCode::SttUnavailable, "whisperx backend unreachable", e.to_string())
                    })?;

                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        return Err(AppError::operator(
                            ErrorCode::SttTranscriptionFailed,
                            "STT transcription failed",
                            format!("whisperx job poll returned {status}: {body}"),
                        ));
                    }

                    let body = response.text().await.unwrap_or_default();
                    let status: JobStatusResponse = serde_json::from_str(&body).map_err(|e| {
                        AppError::operator(
                            ErrorCode::SttTranscriptionFailed,
                            "STT transcription failed",
                            format!("malformed whisperx job-status response: {e}"),
                        )
                    })?;

                    match status {
                        JobStatusResponse::Completed { result } => return Ok(result),
                        JobStatusResponse::Failed { error } => {
                            return Err(AppError::operator(
                                ErrorCode::SttTranscriptionFailed,
                                "STT transcription failed",
                                format!("whisperx job failed: {error}"),
                            ));
                        }
                        JobStatusResponse::Processing | JobStatusResponse::Pending => continue,
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SttProvider for WhisperXProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Whisperx
    }

    fn name(&self) -> &str {
        "whisperx"
    }

    async fn transcribe(&self, audio: AudioPayload, ctx: TranscribeCtx) -> Result<SttResult, AppError> {
        let started = Instant::now();
        let language = ctx
            .language_hint
            .clone()
            .unwrap_or_else(|| self.config.language.clone());

        let job_id = self.submit_job(&audio, &language).await?;
        let parsed = self.poll_job(&job_id, &ctx).await?;
        let text = parsed.normalize()?;

        Ok(SttResult {
            text,
            language: parsed.language.unwrap_or(language),
            confidence: parsed.confidence,
            provider_id: ProviderId::Whisperx,
            model: Some(self.config.model.clone()),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> SttHealth {
        let started = Instant::now();
        match self.http.get(&self.config.base_url).send().await {
            Ok(resp) => SttHealth {
                healthy: resp.status().is_success() || resp.status().as_u16() == 404,
                message: format!("reachable, status {}", resp.status()),
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => {
                warn!(error = %e, "whisperx health check failed");
                SttHealth {
                    healthy: false,
                    message: format!("unreachable: {e}"),
                    latency_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_and_name_are_stable() {
        let provider = WhisperXProvider::new(WhisperXConfig::default()).unwrap();
        assert_eq!(provider.provider_id(), ProviderId::Whisperx);
        assert_eq!(provider.name(), "whisperx");
    }

    #[test]
    fn job_url_strips_trailing_slash() {
        let mut cfg = WhisperXConfig::default();
        cfg.base_url = "http://localhost:9000/".to_string();
        let provider = WhisperXProvider::new(cfg).unwrap();
        assert_eq!(provider.job_url("abc"), "http://localhost:9000/jobs/abc");
    }
}
