//! Config-change listeners that rebuild the STT provider map and the
//! agent-runtime client (spec §4.7). Both are grounded on the same
//! principle the config store itself uses: never mutate what a reader
//! might be holding, always publish a fresh instance through shared
//! indirection (`DashMap` entry replace, `ArcSwap` swap).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agent::{AgentClientConfig, AgentRuntimeClient};
use crate::config::{ConfigChangeListener, GatewayConfig, SettingsPatch};
use crate::errors::AppError;
use crate::ids::ProviderId;
use crate::orchestrator::{AgentClientHolder, ProviderMap};
use crate::stt::{CustomSttProvider, OpenAiSttProvider, SttProvider, WhisperXProvider};

fn build_provider(id: ProviderId, config: &GatewayConfig) -> Result<Arc<dyn SttProvider>, AppError> {
    Ok(match id {
        ProviderId::Whisperx => Arc::new(WhisperXProvider::new(config.whisperx.clone())?),
        ProviderId::Openai => Arc::new(OpenAiSttProvider::new(config.openai.clone())?),
        ProviderId::Custom => Arc::new(CustomSttProvider::new(config.custom.clone())?),
    })
}

/// Builds only `config.sttProvider` at startup. The other two provider
/// kinds are left unbuilt until a patch either touches their config
/// section or newly selects them (`SttProviderRebuilder::on_change`) —
/// building all three eagerly would mean a realistic single-provider
/// deployment fails to start on an unconfigured sibling provider's
/// `MISSING_CONFIG` (e.g. an empty OpenAI API key or custom auth header).
pub fn build_initial_providers(config: &GatewayConfig) -> Result<Arc<ProviderMap>, AppError> {
    let map = ProviderMap::new();
    map.insert(config.stt_provider, build_provider(config.stt_provider, config)?);
    Ok(Arc::new(map))
}

/// On patch, rebuilds whichever provider's config section changed, plus
/// whichever provider was newly selected via `sttProvider` (spec §4.7).
/// Unrelated patches — ones naming neither a provider section nor a new
/// `sttProvider` — are a genuine no-op: nothing is rebuilt at all.
pub struct SttProviderRebuilder {
    providers: Arc<ProviderMap>,
}

impl SttProviderRebuilder {
    pub fn new(providers: Arc<ProviderMap>) -> Self {
        SttProviderRebuilder { providers }
    }
}

#[async_trait]
impl ConfigChangeListener for SttProviderRebuilder {
    async fn on_change(&self, patch: &SettingsPatch, new_config: &Arc<GatewayConfig>) {
        let mut to_rebuild = Vec::with_capacity(3);
        if patch.whisperx.is_some() {
            to_rebuild.push(ProviderId::Whisperx);
        }
        if patch.openai.is_some() {
            to_rebuild.push(ProviderId::Openai);
        }
        if patch.custom.is_some() {
            to_rebuild.push(ProviderId::Custom);
        }
        if let Some(selected) = patch.stt_provider {
            if !to_rebuild.contains(&selected) {
                to_rebuild.push(selected);
            }
        }

        for id in to_rebuild {
            match build_provider(id, new_config) {
                Ok(provider) => {
                    self.providers.insert(id, provider);
                }
                Err(e) => {
                    warn!(provider = id.as_str(), error = %e, "failed to rebuild STT provider, keeping previous instance");
                }
            }
        }
    }
}

/// If the patch touched `agentGatewayUrl` or `agentGatewayToken`, builds a
/// fresh client, swaps it into the holder, then disconnects the prior
/// instance. Reads always go through the holder so shutdown disconnects
/// whichever client is current at that moment. Any other patch — one that
/// leaves both of those keys untouched — is a no-op: the live connection
/// is left alone.
pub struct AgentClientRebuilder {
    holder: Arc<AgentClientHolder>,
    handshake_timeout_ms: u64,
}

impl AgentClientRebuilder {
    pub fn new(holder: Arc<AgentClientHolder>, handshake_timeout_ms: u64) -> Self {
        AgentClientRebuilder {
            holder,
            handshake_timeout_ms,
        }
    }
}

#[async_trait]
impl ConfigChangeListener for AgentClientRebuilder {
    async fn on_change(&self, patch: &SettingsPatch, new_config: &Arc<GatewayConfig>) {
        if patch.agent_gateway_url.is_none() && patch.agent_gateway_token.is_none() {
            return;
        }

        let fresh = AgentRuntimeClient::new(AgentClientConfig {
            url: new_config.agent_gateway_url.clone(),
            token: new_config.agent_gateway_token.clone(),
            handshake_timeout_ms: self.handshake_timeout_ms,
        });
        let previous = self.holder.swap(fresh);
        info!("agent-runtime client rebuilt, draining previous instance");
        previous.disconnect().await;
    }
}
