//! Branded identifiers: `TurnId`, `SessionKey`, `ProviderId`.
//!
//! Constructors validate and fail with `INVALID_CONFIG` on empty/unknown
//! input, per spec §3.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, ErrorCode};

/// Per-request correlation id. Always generated fresh by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TurnId(String);

impl TurnId {
    pub fn new() -> Self {
        TurnId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies an agent-runtime session. Non-empty, branded at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(raw: impl Into<String>) -> Result<Self, AppError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(AppError::user(
                ErrorCode::InvalidConfig,
                "agentSessionKey must be a non-empty string",
            ));
        }
        Ok(SessionKey(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The enumerated set of STT backends the gateway can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Whisperx,
    Openai,
    Custom,
}

impl ProviderId {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.to_ascii_lowercase().as_str() {
            "whisperx" => Ok(ProviderId::Whisperx),
            "openai" => Ok(ProviderId::Openai),
            "custom" => Ok(ProviderId::Custom),
            other => Err(AppError::user(
                ErrorCode::InvalidConfig,
                format!("unknown sttProvider '{other}'"),
            )),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Whisperx => "whisperx",
            ProviderId::Openai => "openai",
            ProviderId::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
