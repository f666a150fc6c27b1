//! STT provider contract (spec §4.2): a small trait with three concrete
//! backends, collapsed from a per-provider module layout
//! (`core/stt/openai/{client,config,messages}.rs`) to the fields this
//! system's data model actually names.

mod backend_format;
mod custom;
mod openai;
mod whisperx;

pub use custom::CustomSttProvider;
pub use openai::OpenAiSttProvider;
pub use whisperx::WhisperXProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::errors::AppError;
use crate::ids::{ProviderId, TurnId};

/// Raw audio accepted at the HTTP boundary (spec §3). Content-type is
/// checked against the allowlist before a provider ever sees the payload.
pub struct AudioPayload {
    pub bytes: bytes::Bytes,
    pub content_type: String,
    pub sample_rate: Option<u32>,
    pub language_hint: Option<String>,
}

pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "audio/wav",
    "audio/x-wav",
    "audio/pcm",
    "audio/ogg",
    "audio/mpeg",
    "audio/webm",
];

pub fn is_allowed_content_type(content_type: &str) -> bool {
    let normalized = content_type.split(';').next().unwrap_or("").trim();
    ALLOWED_CONTENT_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(normalized))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttResult {
    pub text: String,
    pub language: String,
    pub confidence: Option<f64>,
    pub provider_id: ProviderId,
    pub model: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TranscribeCtx {
    pub turn_id: TurnId,
    pub language_hint: Option<String>,
    pub cancellation: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct SttHealth {
    pub healthy: bool,
    pub message: String,
    pub latency_ms: u64,
}

/// Capability set every STT backend implements: `{transcribe, healthCheck,
/// providerId, name}` (spec §9 design note — interface form preferred since
/// providers have distinct network behaviors).
#[async_trait]
pub trait SttProvider: Send + Sync {
    fn provider_id(&self) -> ProviderId;
    fn name(&self) -> &str;
    async fn transcribe(&self, audio: AudioPayload, ctx: TranscribeCtx) -> Result<SttResult, AppError>;
    async fn health_check(&self) -> SttHealth;
}
