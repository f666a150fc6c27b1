//! `validateSettingsPatch` (spec §4.1): validates an unknown JSON map against
//! the per-key contract table, dropping unrecognized keys silently and
//! producing a typed, partial `SettingsPatch` the store can deep-merge.

use serde_json::Value;
use url::Url;

use super::GatewayConfig;
use crate::errors::{AppError, ErrorCode};
use crate::ids::{ProviderId, SessionKey};
use crate::secret::Secret;

#[derive(Debug, Clone, Default)]
pub struct WhisperXPatch {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub auth_header: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OpenAiPatch {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomPatch {
    pub url: Option<String>,
    pub auth_header: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ServerPatch {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub cors_origins: Option<Vec<String>>,
    pub max_audio_bytes: Option<usize>,
    pub rate_limit_per_minute: Option<u32>,
    pub turn_deadline_ms: Option<u64>,
}

/// A validated, partial patch over `GatewayConfig`. Only recognized,
/// individually-valid keys survive `validate_settings_patch`.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub agent_gateway_url: Option<String>,
    pub agent_gateway_token: Option<String>,
    pub agent_session_key: Option<String>,
    pub stt_provider: Option<ProviderId>,
    pub whisperx: Option<WhisperXPatch>,
    pub openai: Option<OpenAiPatch>,
    pub custom: Option<CustomPatch>,
    pub server: Option<ServerPatch>,
}

fn non_empty_string(value: &Value, field: &str) -> Result<String, AppError> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(AppError::user(
            ErrorCode::InvalidConfig,
            format!("'{field}' must be a non-empty string"),
        )),
    }
}

fn valid_url(value: &Value, field: &str) -> Result<String, AppError> {
    let s = non_empty_string(value, field)?;
    Url::parse(&s).map_err(|e| {
        AppError::user(
            ErrorCode::InvalidConfig,
            format!("'{field}' is not a valid URL: {e}"),
        )
    })?;
    Ok(s)
}

fn positive_integer(value: &Value, field: &str) -> Result<u64, AppError> {
    match value.as_u64() {
        Some(n) if n > 0 => Ok(n),
        _ => Err(AppError::user(
            ErrorCode::InvalidConfig,
            format!("'{field}' must be a strictly positive integer"),
        )),
    }
}

/// Like `positive_integer` but allows zero (the port field, for test binds).
fn non_negative_port(value: &Value, field: &str) -> Result<u16, AppError> {
    match value.as_u64() {
        Some(n) if n <= u16::MAX as u64 => Ok(n as u16),
        _ => Err(AppError::user(
            ErrorCode::InvalidConfig,
            format!("'{field}' must fit in a u16"),
        )),
    }
}

fn object_field<'a>(obj: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key)
}

fn validate_whisperx(value: &Value) -> Result<WhisperXPatch, AppError> {
    let obj = value.as_object().ok_or_else(|| {
        AppError::user(ErrorCode::InvalidConfig, "'whisperx' must be an object")
    })?;
    let mut patch = WhisperXPatch::default();
    if let Some(v) = object_field(obj, "baseUrl") {
        patch.base_url = Some(valid_url(v, "whisperx.baseUrl")?);
    }
    if let Some(v) = object_field(obj, "model") {
        patch.model = Some(non_empty_string(v, "whisperx.model")?);
    }
    if let Some(v) = object_field(obj, "language") {
        patch.language = Some(non_empty_string(v, "whisperx.language")?);
    }
    if let Some(v) = object_field(obj, "pollIntervalMs") {
        patch.poll_interval_ms = Some(positive_integer(v, "whisperx.pollIntervalMs")?);
    }
    if let Some(v) = object_field(obj, "timeoutMs") {
        patch.timeout_ms = Some(positive_integer(v, "whisperx.timeoutMs")?);
    }
    if let Some(v) = object_field(obj, "authHeader") {
        patch.auth_header = Some(non_empty_string(v, "whisperx.authHeader")?);
    }
    Ok(patch)
}

fn validate_openai(value: &Value) -> Result<OpenAiPatch, AppError> {
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::user(ErrorCode::InvalidConfig, "'openai' must be an object"))?;
    let mut patch = OpenAiPatch::default();
    if let Some(v) = object_field(obj, "baseUrl") {
        patch.base_url = Some(valid_url(v, "openai.baseUrl")?);
    }
    if let Some(v) = object_field(obj, "apiKey") {
        patch.api_key = Some(non_empty_string(v, "openai.apiKey")?);
    }
    if let Some(v) = object_field(obj, "model") {
        patch.model = Some(non_empty_string(v, "openai.model")?);
    }
    if let Some(v) = object_field(obj, "language") {
        patch.language = Some(non_empty_string(v, "openai.language")?);
    }
    if let Some(v) = object_field(obj, "timeoutMs") {
        patch.timeout_ms = Some(positive_integer(v, "openai.timeoutMs")?);
    }
    Ok(patch)
}

fn validate_custom(value: &Value) -> Result<CustomPatch, AppError> {
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::user(ErrorCode::InvalidConfig, "'custom' must be an object"))?;
    let mut patch = CustomPatch::default();
    if let Some(v) = object_field(obj, "url") {
        patch.url = Some(valid_url(v, "custom.url")?);
    }
    if let Some(v) = object_field(obj, "authHeader") {
        patch.auth_header = Some(non_empty_string(v, "custom.authHeader")?);
    }
    if let Some(v) = object_field(obj, "model") {
        patch.model = Some(non_empty_string(v, "custom.model")?);
    }
    if let Some(v) = object_field(obj, "language") {
        patch.language = Some(non_empty_string(v, "custom.language")?);
    }
    if let Some(v) = object_field(obj, "timeoutMs") {
        patch.timeout_ms = Some(positive_integer(v, "custom.timeoutMs")?);
    }
    if let Some(v) = object_field(obj, "pollIntervalMs") {
        patch.poll_interval_ms = Some(positive_integer(v, "custom.pollIntervalMs")?);
    }
    Ok(patch)
}

fn validate_server(value: &Value) -> Result<ServerPatch, AppError> {
    let obj = value
        .as_object()
        .ok_or_else(|| AppError::user(ErrorCode::InvalidConfig, "'server' must be an object"))?;
    let mut patch = ServerPatch::default();
    if let Some(v) = object_field(obj, "port") {
        patch.port = Some(non_negative_port(v, "server.port")?);
    }
    if let Some(v) = object_field(obj, "host") {
        patch.host = Some(non_empty_string(v, "server.host")?);
    }
    if let Some(v) = object_field(obj, "corsOrigins") {
        let arr = v.as_array().ok_or_else(|| {
            AppError::user(ErrorCode::InvalidConfig, "'server.corsOrigins' must be an array")
        })?;
        let mut origins = Vec::with_capacity(arr.len());
        for item in arr {
            origins.push(non_empty_string(item, "server.corsOrigins[]")?);
        }
        patch.cors_origins = Some(origins);
    }
    if let Some(v) = object_field(obj, "maxAudioBytes") {
        patch.max_audio_bytes = Some(positive_integer(v, "server.maxAudioBytes")? as usize);
    }
    if let Some(v) = object_field(obj, "rateLimitPerMinute") {
        patch.rate_limit_per_minute =
            Some(positive_integer(v, "server.rateLimitPerMinute")? as u32);
    }
    if let Some(v) = object_field(obj, "turnDeadlineMs") {
        patch.turn_deadline_ms = Some(positive_integer(v, "server.turnDeadlineMs")?);
    }
    Ok(patch)
}

/// Validate an unknown JSON map into a `SettingsPatch`. Non-object/`null`
/// inputs fail with `INVALID_CONFIG`; unrecognized top-level keys are
/// silently dropped.
pub fn validate_settings_patch(raw: &Value) -> Result<SettingsPatch, AppError> {
    let obj = raw.as_object().ok_or_else(|| {
        AppError::user(ErrorCode::InvalidConfig, "settings patch must be a JSON object")
    })?;

    let mut patch = SettingsPatch::default();

    if let Some(v) = object_field(obj, "agentGatewayUrl") {
        patch.agent_gateway_url = Some(valid_url(v, "agentGatewayUrl")?);
    }
    if let Some(v) = object_field(obj, "agentGatewayToken") {
        patch.agent_gateway_token = Some(non_empty_string(v, "agentGatewayToken")?);
    }
    if let Some(v) = object_field(obj, "agentSessionKey") {
        patch.agent_session_key = Some(non_empty_string(v, "agentSessionKey")?);
    }
    if let Some(v) = object_field(obj, "sttProvider") {
        let raw_provider = non_empty_string(v, "sttProvider")?;
        patch.stt_provider = Some(ProviderId::parse(&raw_provider)?);
    }
    if let Some(v) = object_field(obj, "whisperx") {
        patch.whisperx = Some(validate_whisperx(v)?);
    }
    if let Some(v) = object_field(obj, "openai") {
        patch.openai = Some(validate_openai(v)?);
    }
    if let Some(v) = object_field(obj, "custom") {
        patch.custom = Some(validate_custom(v)?);
    }
    if let Some(v) = object_field(obj, "server") {
        patch.server = Some(validate_server(v)?);
    }

    Ok(patch)
}

impl GatewayConfig {
    /// Deep-merge a validated patch into a clone of this snapshot. Nested
    /// objects (`whisperx`, `openai`, `custom`, `server`) merge field by
    /// field; every other top-level field replaces wholesale.
    pub fn apply_patch(&self, patch: &SettingsPatch) -> Result<GatewayConfig, AppError> {
        let mut next = self.clone();

        if let Some(ref url) = patch.agent_gateway_url {
            next.agent_gateway_url = url.clone();
        }
        if let Some(ref token) = patch.agent_gateway_token {
            next.agent_gateway_token = Secret::new(token.clone());
        }
        if let Some(ref key) = patch.agent_session_key {
            next.agent_session_key = SessionKey::new(key.clone())?;
        }
        if let Some(provider) = patch.stt_provider {
            next.stt_provider = provider;
        }

        if let Some(ref p) = patch.whisperx {
            if let Some(ref v) = p.base_url {
                next.whisperx.base_url = v.clone();
            }
            if let Some(ref v) = p.model {
                next.whisperx.model = v.clone();
            }
            if let Some(ref v) = p.language {
                next.whisperx.language = v.clone();
            }
            if let Some(v) = p.poll_interval_ms {
                next.whisperx.poll_interval_ms = v;
            }
            if let Some(v) = p.timeout_ms {
                next.whisperx.timeout_ms = v;
            }
            if let Some(ref v) = p.auth_header {
                next.whisperx.auth_header = Some(v.clone());
            }
        }

        if let Some(ref p) = patch.openai {
            if let Some(ref v) = p.base_url {
                next.openai.base_url = v.clone();
            }
            if let Some(ref v) = p.api_key {
                next.openai.api_key = Secret::new(v.clone());
            }
            if let Some(ref v) = p.model {
                next.openai.model = v.clone();
            }
            if let Some(ref v) = p.language {
                next.openai.language = v.clone();
            }
            if let Some(v) = p.timeout_ms {
                next.openai.timeout_ms = v;
            }
        }

        if let Some(ref p) = patch.custom {
            if let Some(ref v) = p.url {
                next.custom.url = v.clone();
            }
            if let Some(ref v) = p.auth_header {
                next.custom.auth_header = Secret::new(v.clone());
            }
            if let Some(ref v) = p.model {
                next.custom.model = v.clone();
            }
            if let Some(ref v) = p.language {
                next.custom.language = v.clone();
            }
            if let Some(v) = p.timeout_ms {
                next.custom.timeout_ms = v;
            }
            if let Some(v) = p.poll_interval_ms {
                next.custom.poll_interval_ms = v;
            }
        }

        if let Some(ref p) = patch.server {
            if let Some(v) = p.port {
                next.server.port = v;
            }
            if let Some(ref v) = p.host {
                next.server.host = v.clone();
            }
            if let Some(ref v) = p.cors_origins {
                next.server.cors_origins = v.clone();
            }
            if let Some(v) = p.max_audio_bytes {
                next.server.max_audio_bytes = v;
            }
            if let Some(v) = p.rate_limit_per_minute {
                next.server.rate_limit_per_minute = v;
            }
            if let Some(v) = p.turn_deadline_ms {
                next.server.turn_deadline_ms = v;
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_object_patch() {
        assert!(validate_settings_patch(&json!("not an object")).is_err());
        assert!(validate_settings_patch(&json!(null)).is_err());
    }

    #[test]
    fn drops_unknown_top_level_keys() {
        let patch = validate_settings_patch(&json!({
            "agentGatewayUrl": "wss://example.test/agent",
            "totallyUnknownKey": 42,
        }))
        .unwrap();
        assert_eq!(
            patch.agent_gateway_url.as_deref(),
            Some("wss://example.test/agent")
        );
    }

    #[test]
    fn rejects_bad_url() {
        assert!(validate_settings_patch(&json!({"agentGatewayUrl": "not a url"})).is_err());
    }

    #[test]
    fn rejects_non_positive_integers() {
        assert!(validate_settings_patch(&json!({"server": {"rateLimitPerMinute": 0}})).is_err());
        assert!(validate_settings_patch(&json!({"server": {"rateLimitPerMinute": -1}})).is_err());
        assert!(validate_settings_patch(&json!({"whisperx": {"timeoutMs": 0}})).is_err());
    }

    #[test]
    fn allows_port_zero() {
        let patch = validate_settings_patch(&json!({"server": {"port": 0}})).unwrap();
        assert_eq!(patch.server.unwrap().port, Some(0));
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(validate_settings_patch(&json!({"sttProvider": "bogus"})).is_err());
    }

    #[test]
    fn deep_merge_preserves_untouched_nested_fields() {
        let base = GatewayConfig {
            agent_gateway_url: "wss://a.test".to_string(),
            agent_gateway_token: Secret::new("tok"),
            agent_session_key: SessionKey::new("s").unwrap(),
            stt_provider: ProviderId::Whisperx,
            whisperx: super::super::WhisperXConfig::default(),
            openai: super::super::OpenAiSttConfig::default(),
            custom: super::super::CustomSttConfig::default(),
            server: super::super::ServerSettings::default(),
        };
        let patch = validate_settings_patch(&json!({
            "whisperx": {"model": "large-v2"}
        }))
        .unwrap();
        let merged = base.apply_patch(&patch).unwrap();
        assert_eq!(merged.whisperx.model, "large-v2");
        // Untouched nested fields survive the merge.
        assert_eq!(merged.whisperx.language, base.whisperx.language);
        assert_eq!(merged.whisperx.base_url, base.whisperx.base_url);
    }
}
