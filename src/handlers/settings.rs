//! `GET`/`POST /api/settings` (spec §6): read the masked config, or apply
//! a validated patch.

use axum::Json;
use axum::extract::State;

use crate::config::{SafeConfig, validate_settings_patch};
use crate::errors::AppResult;
use crate::state::AppState;

pub async fn get_settings(State(state): State<AppState>) -> Json<SafeConfig> {
    Json(state.config.get_safe())
}

pub async fn post_settings(
    State(state): State<AppState>,
    Json(raw): Json<serde_json::Value>,
) -> AppResult<Json<SafeConfig>> {
    let patch = validate_settings_patch(&raw)?;
    let updated = state.config.update(&patch).await?;
    Ok(Json(SafeConfig::from(updated.as_ref())))
}
