//! Runtime-configuration core: immutable-snapshot config store with
//! validated partial updates and change-listener fan-out (spec §4.1).
//!
//! Submodules:
//! - `patch`: `validateSettingsPatch` and the `SettingsPatch` shape
//! - `store`: `ConfigStore`, the atomic snapshot holder and listener fan-out
//! - `env`: startup config from environment variables

mod env;
mod patch;
mod store;

pub use env::ConfigError;
pub use patch::{
    CustomPatch, OpenAiPatch, ServerPatch, SettingsPatch, WhisperXPatch, validate_settings_patch,
};
pub use store::{ConfigChangeListener, ConfigStore};

use std::collections::HashMap;

use serde::Serialize;

use crate::ids::{ProviderId, SessionKey};
use crate::secret::{MASKED, Secret};

/// Per-provider configuration group shared shape for `whisperx`.
#[derive(Debug, Clone)]
pub struct WhisperXConfig {
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub auth_header: Option<String>,
    pub field_mappings: Option<HashMap<String, String>>,
}

impl Default for WhisperXConfig {
    fn default() -> Self {
        WhisperXConfig {
            base_url: "http://localhost:9000".to_string(),
            model: "medium".to_string(),
            language: "en".to_string(),
            poll_interval_ms: 500,
            timeout_ms: 20_000,
            auth_header: None,
            field_mappings: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSttConfig {
    pub base_url: String,
    pub api_key: Secret,
    pub model: String,
    pub language: String,
    pub timeout_ms: u64,
    pub field_mappings: Option<HashMap<String, String>>,
}

impl Default for OpenAiSttConfig {
    fn default() -> Self {
        OpenAiSttConfig {
            base_url: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            api_key: Secret::new(""),
            model: "whisper-1".to_string(),
            language: "en".to_string(),
            timeout_ms: 20_000,
            field_mappings: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CustomSttConfig {
    pub url: String,
    pub auth_header: Secret,
    pub model: String,
    pub language: String,
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub field_mappings: Option<HashMap<String, String>>,
}

impl Default for CustomSttConfig {
    fn default() -> Self {
        CustomSttConfig {
            url: "http://localhost:9100/transcribe".to_string(),
            auth_header: Secret::new(""),
            model: "custom".to_string(),
            language: "en".to_string(),
            timeout_ms: 20_000,
            poll_interval_ms: 500,
            field_mappings: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub max_audio_bytes: usize,
    pub rate_limit_per_minute: u32,
    pub turn_deadline_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
            max_audio_bytes: 10 * 1024 * 1024,
            rate_limit_per_minute: 60,
            turn_deadline_ms: 20_000,
        }
    }
}

/// The immutable, atomically-replaced configuration snapshot (spec §3).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub agent_gateway_url: String,
    pub agent_gateway_token: Secret,
    pub agent_session_key: SessionKey,
    pub stt_provider: ProviderId,
    pub whisperx: WhisperXConfig,
    pub openai: OpenAiSttConfig,
    pub custom: CustomSttConfig,
    pub server: ServerSettings,
}

impl GatewayConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// A derived view of `GatewayConfig` with every secret replaced by a fixed
/// masked literal, safe to hand to `GET /api/settings`.
#[derive(Debug, Clone, Serialize)]
pub struct SafeConfig {
    pub agent_gateway_url: String,
    pub agent_gateway_token: String,
    pub agent_session_key: String,
    pub stt_provider: String,
    pub whisperx: SafeWhisperX,
    pub openai: SafeOpenAi,
    pub custom: SafeCustom,
    pub server: SafeServer,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafeWhisperX {
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafeOpenAi {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafeCustom {
    pub url: String,
    pub auth_header: String,
    pub model: String,
    pub language: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SafeServer {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub max_audio_bytes: usize,
    pub rate_limit_per_minute: u32,
    pub turn_deadline_ms: u64,
}

impl From<&GatewayConfig> for SafeConfig {
    fn from(cfg: &GatewayConfig) -> Self {
        SafeConfig {
            agent_gateway_url: cfg.agent_gateway_url.clone(),
            agent_gateway_token: MASKED.to_string(),
            agent_session_key: cfg.agent_session_key.as_str().to_string(),
            stt_provider: cfg.stt_provider.as_str().to_string(),
            whisperx: SafeWhisperX {
                base_url: cfg.whisperx.base_url.clone(),
                model: cfg.whisperx.model.clone(),
                language: cfg.whisperx.language.clone(),
                poll_interval_ms: cfg.whisperx.poll_interval_ms,
                timeout_ms: cfg.whisperx.timeout_ms,
            },
            openai: SafeOpenAi {
                base_url: cfg.openai.base_url.clone(),
                api_key: MASKED.to_string(),
                model: cfg.openai.model.clone(),
                language: cfg.openai.language.clone(),
                timeout_ms: cfg.openai.timeout_ms,
            },
            custom: SafeCustom {
                url: cfg.custom.url.clone(),
                auth_header: MASKED.to_string(),
                model: cfg.custom.model.clone(),
                language: cfg.custom.language.clone(),
                timeout_ms: cfg.custom.timeout_ms,
            },
            server: SafeServer {
                port: cfg.server.port,
                host: cfg.server.host.clone(),
                cors_origins: cfg.server.cors_origins.clone(),
                max_audio_bytes: cfg.server.max_audio_bytes,
                rate_limit_per_minute: cfg.server.rate_limit_per_minute,
                turn_deadline_ms: cfg.server.turn_deadline_ms,
            },
        }
    }
}
