//! Router assembly: wires handlers behind the rate-limit and CORS guards
//! (spec §6's HTTP surface table).

use axum::Router;
use axum::routing::{get, post};

use crate::handlers::{health, settings, voice_turn};
use crate::middleware::{cors_guard_middleware, rate_limit_middleware};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/api/voice/turn", post(voice_turn::voice_turn))
        .route("/api/settings", get(settings::get_settings).post(settings::post_settings))
        .layer(axum::middleware::from_fn_with_state(state.clone(), cors_guard_middleware))
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_middleware));

    let public = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz));

    Router::new().merge(guarded).merge(public).with_state(state)
}
