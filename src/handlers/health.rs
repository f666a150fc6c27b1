//! `GET /healthz` and `GET /readyz` (spec §6): liveness is unconditional;
//! readiness aggregates STT provider health and agent-runtime connectivity.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::agent::ClientState;
use crate::ids::ProviderId;
use crate::state::AppState;

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
struct ProviderHealthEntry {
    provider: ProviderId,
    healthy: bool,
    message: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ReadyBody {
    ready: bool,
    stt_providers: Vec<ProviderHealthEntry>,
    agent_connected: bool,
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let mut stt_providers = Vec::new();
    let mut all_healthy = true;
    for entry in state.providers.iter() {
        let health = entry.value().health_check().await;
        all_healthy &= health.healthy;
        stt_providers.push(ProviderHealthEntry {
            provider: *entry.key(),
            healthy: health.healthy,
            message: health.message,
            latency_ms: health.latency_ms,
        });
    }

    // Reports the client's last-known state rather than forcing a fresh
    // handshake attempt here — readiness probes run often and shouldn't
    // pay reconnect backoff latency; the client connects lazily on the
    // first turn that needs it.
    let agent_state = state.agent_client.get().state().await;
    let agent_connected = matches!(agent_state, ClientState::Ready);

    let ready = all_healthy && agent_connected;
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status, Json(ReadyBody { ready, stt_providers, agent_connected }))
}
