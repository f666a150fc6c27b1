//! The per-turn pipeline (spec §4.4): validate → STT → agent dispatch →
//! shape → envelope. One `Orchestrator` is shared process-wide; it reads
//! through the config store, provider map, and agent client holder rather
//! than owning any of them, so a config update mid-flight never changes
//! what an in-progress turn sees (step 3 pins a snapshot at entry).

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::agent::AgentRuntimeClient;
use crate::config::ConfigStore;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::ids::TurnId;
use crate::reply::{GatewayReply, ReplyMeta, Timing};
use crate::shaper::{self, ShapeLimits};
use crate::stt::{self, AudioPayload, SttProvider, TranscribeCtx};

pub type ProviderMap = dashmap::DashMap<crate::ids::ProviderId, Arc<dyn SttProvider>>;

/// Swappable holder for the process-lifetime agent-runtime client
/// (spec §4.7): the orchestrator and the rebuilder both read/write through
/// this indirection so a rebuild is visible to every subsequent turn and
/// to shutdown.
pub struct AgentClientHolder {
    inner: arc_swap::ArcSwap<AgentRuntimeClient>,
}

impl AgentClientHolder {
    pub fn new(client: Arc<AgentRuntimeClient>) -> Self {
        AgentClientHolder {
            inner: arc_swap::ArcSwap::new(client),
        }
    }

    pub fn get(&self) -> Arc<AgentRuntimeClient> {
        self.inner.load_full()
    }

    pub fn swap(&self, client: Arc<AgentRuntimeClient>) -> Arc<AgentRuntimeClient> {
        self.inner.swap(client)
    }
}

pub struct Orchestrator {
    config: Arc<ConfigStore>,
    providers: Arc<ProviderMap>,
    agent_client: Arc<AgentClientHolder>,
    shape_limits: ShapeLimits,
}

/// Fixed budget for turn overhead beyond `sttMs + agentMs` (shaping,
/// envelope construction); kept out of `meta` — it only shows up baked
/// into `timing.totalMs`.
const OVERHEAD_MS: u64 = 1;

impl Orchestrator {
    pub fn new(config: Arc<ConfigStore>, providers: Arc<ProviderMap>, agent_client: Arc<AgentClientHolder>) -> Self {
        Orchestrator {
            config,
            providers,
            agent_client,
            shape_limits: ShapeLimits::default(),
        }
    }

    pub async fn handle_turn(
        &self,
        bytes: Bytes,
        content_type: &str,
        language_hint: Option<String>,
        cancellation: CancellationToken,
    ) -> AppResult<GatewayReply> {
        let turn_id = TurnId::new();

        if !stt::is_allowed_content_type(content_type) {
            return Err(AppError::user(
                ErrorCode::InvalidContentType,
                format!("unsupported audio content type '{content_type}'"),
            ));
        }

        // Pin the snapshot for the whole turn (spec §4.4 step 3): a
        // mid-turn provider swap must never change this turn's `meta`.
        let config = self.config.get();

        if bytes.len() > config.server.max_audio_bytes {
            return Err(AppError::user(
                ErrorCode::AudioTooLarge,
                format!("audio payload exceeds {} bytes", config.server.max_audio_bytes),
            ));
        }

        let provider = self
            .providers
            .get(&config.stt_provider)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                AppError::operator(
                    ErrorCode::MissingConfig,
                    "no STT provider configured",
                    format!("no provider registered for {:?}", config.stt_provider),
                )
            })?;

        let audio = AudioPayload {
            bytes,
            content_type: content_type.to_string(),
            sample_rate: None,
            language_hint: language_hint.clone(),
        };

        let stt_ctx = TranscribeCtx {
            turn_id: turn_id.clone(),
            language_hint,
            cancellation: cancellation.child_token(),
        };

        let stt_started = Instant::now();
        let stt_result = provider.transcribe(audio, stt_ctx).await?;
        let stt_ms = stt_started.elapsed().as_millis() as u64;

        let agent_started = Instant::now();
        let client = self.agent_client.get();
        let send_timeout_ms = chat_send_timeout_ms(&config, stt_ms);
        let assistant_text = tokio::select! {
            result = client.send(&config.agent_session_key, &stt_result.text, send_timeout_ms) => result?,
            _ = cancellation.cancelled() => {
                return Err(AppError::user(ErrorCode::OpenclawTimeout, "turn cancelled by caller"));
            }
        };
        let agent_ms = agent_started.elapsed().as_millis() as u64;

        let shaped = shaper::shape(&assistant_text, self.shape_limits);

        Ok(GatewayReply {
            turn_id,
            session_key: config.agent_session_key.as_str().to_string(),
            assistant: shaped,
            timing: Timing {
                stt_ms,
                agent_ms,
                total_ms: stt_ms + agent_ms + OVERHEAD_MS,
            },
            meta: ReplyMeta {
                provider: stt_result.provider_id,
                model: stt_result.model,
            },
        })
    }
}

/// A small fixed margin subtracted from the remaining turn budget to leave
/// room for shaping and envelope construction after `chat.send` returns.
const DEADLINE_MARGIN_MS: u64 = 250;

/// The floor under which we won't shrink the per-send timeout even if the
/// STT call ate most of the turn deadline; a send this short would almost
/// never succeed, but zero or near-zero is worse than a slim chance.
const MIN_SEND_TIMEOUT_MS: u64 = 1_000;

/// `chat.send`'s `timeoutMs`, strictly tighter than the overall turn
/// deadline once the STT call's actual elapsed time is known (spec §9): a
/// slow STT call shrinks what's left for the agent round trip instead of
/// the two budgets being independent.
fn chat_send_timeout_ms(config: &crate::config::GatewayConfig, stt_ms: u64) -> u64 {
    config
        .server
        .turn_deadline_ms
        .saturating_sub(stt_ms)
        .saturating_sub(DEADLINE_MARGIN_MS)
        .max(MIN_SEND_TIMEOUT_MS)
}
