//! Startup configuration: `GatewayConfig::from_env`, reading the
//! `OPENCLAW_*` / `WHISPERX_*` / `OPENAI_*` / `CUSTOM_STT_*` variables
//! listed in spec §6.2. Strict: any present-but-malformed numeric or URL
//! value fails startup with `INVALID_CONFIG` rather than silently falling
//! back to a default.

use thiserror::Error;

use super::{CustomSttConfig, GatewayConfig, OpenAiSttConfig, ServerSettings, WhisperXConfig};
use crate::ids::{ProviderId, SessionKey};
use crate::secret::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable '{0}'")]
    Missing(&'static str),

    #[error("environment variable '{name}' has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn optional_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn optional_u32(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<u32>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn optional_u16(name: &'static str, default: u16) -> Result<u16, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn optional_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn parse_cors_origins(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

impl GatewayConfig {
    /// Build the startup snapshot from process environment variables.
    /// `dotenvy::dotenv()` should already have been loaded by the caller
    /// (see `main.rs`) so `.env` files participate here too.
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent_gateway_url = required("OPENCLAW_GATEWAY_URL")?;
        let agent_gateway_token = required("OPENCLAW_GATEWAY_TOKEN")?;
        let agent_session_key_raw = required("OPENCLAW_SESSION_KEY")?;
        let agent_session_key =
            SessionKey::new(agent_session_key_raw).map_err(|_| ConfigError::Invalid {
                name: "OPENCLAW_SESSION_KEY",
                reason: "must be a non-empty string".to_string(),
            })?;

        let stt_provider_raw =
            optional("STT_PROVIDER").unwrap_or_else(|| "whisperx".to_string());
        let stt_provider = ProviderId::parse(&stt_provider_raw).map_err(|_| ConfigError::Invalid {
            name: "STT_PROVIDER",
            reason: format!("unknown provider '{stt_provider_raw}'"),
        })?;

        let whisperx_defaults = WhisperXConfig::default();
        let whisperx = WhisperXConfig {
            base_url: optional("WHISPERX_BASE_URL").unwrap_or(whisperx_defaults.base_url),
            model: optional("WHISPERX_MODEL").unwrap_or(whisperx_defaults.model),
            language: optional("WHISPERX_LANGUAGE").unwrap_or(whisperx_defaults.language),
            poll_interval_ms: optional_u64(
                "WHISPERX_POLL_INTERVAL_MS",
                whisperx_defaults.poll_interval_ms,
            )?,
            timeout_ms: optional_u64("WHISPERX_TIMEOUT_MS", whisperx_defaults.timeout_ms)?,
            auth_header: optional("WHISPERX_AUTH_HEADER"),
            field_mappings: None,
        };

        let openai_defaults = OpenAiSttConfig::default();
        let openai = OpenAiSttConfig {
            base_url: optional("OPENAI_BASE_URL").unwrap_or(openai_defaults.base_url),
            api_key: Secret::new(optional("OPENAI_API_KEY").unwrap_or_default()),
            model: optional("OPENAI_MODEL").unwrap_or(openai_defaults.model),
            language: optional("OPENAI_LANGUAGE").unwrap_or(openai_defaults.language),
            timeout_ms: optional_u64("OPENAI_TIMEOUT_MS", openai_defaults.timeout_ms)?,
            field_mappings: None,
        };

        let custom_defaults = CustomSttConfig::default();
        let custom = CustomSttConfig {
            url: optional("CUSTOM_STT_URL").unwrap_or(custom_defaults.url),
            auth_header: Secret::new(optional("CUSTOM_STT_AUTH_HEADER").unwrap_or_default()),
            model: optional("CUSTOM_STT_MODEL").unwrap_or(custom_defaults.model),
            language: optional("CUSTOM_STT_LANGUAGE").unwrap_or(custom_defaults.language),
            timeout_ms: optional_u64("CUSTOM_STT_TIMEOUT_MS", custom_defaults.timeout_ms)?,
            poll_interval_ms: optional_u64(
                "CUSTOM_STT_POLL_INTERVAL_MS",
                custom_defaults.poll_interval_ms,
            )?,
            field_mappings: None,
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            port: optional_u16("PORT", server_defaults.port)?,
            host: optional("HOST").unwrap_or(server_defaults.host),
            cors_origins: parse_cors_origins(optional("CORS_ORIGINS")),
            max_audio_bytes: optional_usize(
                "MAX_AUDIO_BYTES",
                server_defaults.max_audio_bytes,
            )?,
            rate_limit_per_minute: optional_u32(
                "RATE_LIMIT_PER_MINUTE",
                server_defaults.rate_limit_per_minute,
            )?,
            turn_deadline_ms: optional_u64("TURN_DEADLINE_MS", server_defaults.turn_deadline_ms)?,
        };

        Ok(GatewayConfig {
            agent_gateway_url,
            agent_gateway_token: Secret::new(agent_gateway_token),
            agent_session_key,
            stt_provider,
            whisperx,
            openai,
            custom,
            server,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch
    // them so they can't interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_all() {
        for key in [
            "OPENCLAW_GATEWAY_URL",
            "OPENCLAW_GATEWAY_TOKEN",
            "OPENCLAW_SESSION_KEY",
            "STT_PROVIDER",
            "WHISPERX_TIMEOUT_MS",
            "PORT",
            "RATE_LIMIT_PER_MINUTE",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    fn missing_required_var_fails() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        let err = GatewayConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPENCLAW_GATEWAY_URL")));
    }

    #[test]
    fn malformed_numeric_var_fails_strictly() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            std::env::set_var("OPENCLAW_GATEWAY_URL", "wss://agent.test/ws");
            std::env::set_var("OPENCLAW_GATEWAY_TOKEN", "tok");
            std::env::set_var("OPENCLAW_SESSION_KEY", "sess");
            std::env::set_var("PORT", "not-a-number");
        }
        let err = GatewayConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
        clear_all();
    }

    #[test]
    fn valid_minimal_env_builds_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        unsafe {
            std::env::set_var("OPENCLAW_GATEWAY_URL", "wss://agent.test/ws");
            std::env::set_var("OPENCLAW_GATEWAY_TOKEN", "tok");
            std::env::set_var("OPENCLAW_SESSION_KEY", "sess");
        }
        let cfg = GatewayConfig::from_env().unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.stt_provider, ProviderId::Whisperx);
        clear_all();
    }
}
