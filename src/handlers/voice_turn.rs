//! `POST /api/voice/turn` (spec §6): accepts raw audio, returns a
//! `GatewayReply`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, AppResult, ErrorCode};
use crate::reply::GatewayReply;
use crate::state::AppState;

const CONTENT_TYPE: &str = "content-type";
const LANGUAGE_HINT_HEADER: &str = "x-language-hint";

/// Cancels the wrapped token when dropped. Held as a local for the
/// duration of the handler: if the caller disconnects mid-turn, the
/// in-flight connection task that axum/hyper was driving this handler's
/// future on is torn down, dropping this guard along with it, which fires
/// the cancellation the orchestrator's `tokio::select!` is racing against
/// (spec §4.4's "propagate abort on client disconnect").
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub async fn voice_turn(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> AppResult<axum::Json<GatewayReply>> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::user(ErrorCode::InvalidContentType, "missing Content-Type header"))?
        .to_string();

    let language_hint = headers
        .get(LANGUAGE_HINT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let cancellation = CancellationToken::new();
    let _cancel_guard = CancelOnDrop(cancellation.clone());

    let reply = state
        .orchestrator
        .handle_turn(body, &content_type, language_hint, cancellation)
        .await?;

    Ok(axum::Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_the_guard_cancels_the_token() {
        let token = CancellationToken::new();
        let guard = CancelOnDrop(token.clone());
        assert!(!token.is_cancelled());
        drop(guard);
        assert!(token.is_cancelled());
    }
}
