//! The two-kind error taxonomy shared by every component.
//!
//! Every failure in the gateway is either user-kind (safe to expose to the
//! caller verbatim) or operator-kind (carries a `detail` that must never
//! reach an external caller, only the structured log).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// A single stable error code from the taxonomy in spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum ErrorCode {
    InvalidAudio,
    AudioTooLarge,
    InvalidContentType,
    SttTimeout,
    SttTranscriptionFailed,
    SttUnavailable,
    OpenclawTimeout,
    OpenclawUnavailable,
    OpenclawSessionError,
    RateLimited,
    CorsRejected,
    NotReady,
    MissingConfig,
    InvalidConfig,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidAudio => "INVALID_AUDIO",
            ErrorCode::AudioTooLarge => "AUDIO_TOO_LARGE",
            ErrorCode::InvalidContentType => "INVALID_CONTENT_TYPE",
            ErrorCode::SttTimeout => "STT_TIMEOUT",
            ErrorCode::SttTranscriptionFailed => "STT_TRANSCRIPTION_FAILED",
            ErrorCode::SttUnavailable => "STT_UNAVAILABLE",
            ErrorCode::OpenclawTimeout => "OPENCLAW_TIMEOUT",
            ErrorCode::OpenclawUnavailable => "OPENCLAW_UNAVAILABLE",
            ErrorCode::OpenclawSessionError => "OPENCLAW_SESSION_ERROR",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::CorsRejected => "CORS_REJECTED",
            ErrorCode::NotReady => "NOT_READY",
            ErrorCode::MissingConfig => "MISSING_CONFIG",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// The gateway's unified error type. Carries enough to build both the
/// user-safe HTTP body and the fuller structured log line.
#[derive(Debug, Error)]
pub enum AppError {
    /// Safe to send `message` to the caller verbatim.
    #[error("{message}")]
    User { code: ErrorCode, message: String },

    /// `detail` must only ever reach the logs, never the HTTP response.
    #[error("{message}")]
    Operator {
        code: ErrorCode,
        message: String,
        detail: String,
    },
}

impl AppError {
    pub fn user(code: ErrorCode, message: impl Into<String>) -> Self {
        AppError::User {
            code,
            message: message.into(),
        }
    }

    pub fn operator(code: ErrorCode, message: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::Operator {
            code,
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::User { code, .. } => *code,
            AppError::Operator { code, .. } => *code,
        }
    }

    fn status(&self) -> StatusCode {
        // User-kind STT_TRANSCRIPTION_FAILED (empty text) is a 400; the
        // operator-kind flavor (backend failure) is a 500. Both share one
        // ErrorCode, so the kind decides here, not just the code.
        if matches!(self, AppError::Operator { code: ErrorCode::SttTranscriptionFailed, .. }) {
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
        match self.code() {
            ErrorCode::InvalidAudio
            | ErrorCode::InvalidContentType
            | ErrorCode::InvalidConfig
            | ErrorCode::SttTranscriptionFailed
            | ErrorCode::SttTimeout
            | ErrorCode::OpenclawTimeout => StatusCode::BAD_REQUEST,
            ErrorCode::AudioTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::CorsRejected => StatusCode::FORBIDDEN,
            ErrorCode::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::SttUnavailable
            | ErrorCode::OpenclawUnavailable
            | ErrorCode::OpenclawSessionError
            | ErrorCode::MissingConfig
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::User { message, code, .. } => {
                tracing::warn!(code = code.as_str(), "request failed: {message}");
            }
            AppError::Operator {
                message,
                code,
                detail,
            } => {
                tracing::error!(
                    code = code.as_str(),
                    detail = %detail,
                    "operator error: {message}"
                );
            }
        }

        let status = self.status();
        let (error, code) = match self {
            AppError::User { message, code } => (message, code),
            // Operator-kind detail never reaches the caller.
            AppError::Operator { message, code, .. } => (message, code),
        };

        (status, Json(ErrorBody { error, code: code.as_str() })).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
