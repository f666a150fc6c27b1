//! Two request-gating layers ahead of the handlers: the sliding-window
//! rate limiter (spec §4.5) and the CORS origin allowlist guard
//! (spec §6). Both run as `axum::middleware::from_fn_with_state` so they
//! can read `AppState` without extra plumbing.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::{AppError, ErrorCode};
use crate::state::AppState;

/// Guards the mutating routes only: spec §6's HTTP surface table lists
/// `429` as a possible status for `POST /api/voice/turn` and
/// `POST /api/settings`, never for `GET /api/settings`, so a `GET` passes
/// straight through without consuming from the caller's window.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() == Method::GET {
        return Ok(next.run(request).await);
    }
    if !state.rate_limiter.check(addr.ip()) {
        return Err(AppError::user(ErrorCode::RateLimited, "rate limit exceeded"));
    }
    Ok(next.run(request).await)
}

/// When `server.corsOrigins` is non-empty, requests whose `Origin` header
/// isn't in the allowlist are rejected; an empty allowlist means
/// same-origin-only and this guard is a no-op (no `Origin` header on a
/// same-origin request for the methods this gateway exposes).
pub async fn cors_guard_middleware(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let origins = state.config.get().server.cors_origins.clone();
    if origins.is_empty() {
        return Ok(next.run(request).await);
    }

    let origin = request
        .headers()
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    match origin {
        Some(origin) if origins.iter().any(|allowed| allowed == origin) => Ok(next.run(request).await),
        None => Ok(next.run(request).await),
        Some(_) => Err(AppError::user(ErrorCode::CorsRejected, "origin not allowed")),
    }
}
