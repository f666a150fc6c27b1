//! `AppState`: the handful of shared, process-lifetime objects every HTTP
//! handler needs a reference to. Constructed once at startup and cloned
//! (cheaply — every field is an `Arc`) into the router.

use std::sync::Arc;

use crate::agent::{AgentClientConfig, AgentRuntimeClient};
use crate::config::ConfigStore;
use crate::orchestrator::{AgentClientHolder, Orchestrator, ProviderMap};
use crate::rate_limit::RateLimiter;
use crate::rebuild::{AgentClientRebuilder, SttProviderRebuilder, build_initial_providers};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigStore>,
    pub providers: Arc<ProviderMap>,
    pub agent_client: Arc<AgentClientHolder>,
    pub rate_limiter: Arc<RateLimiter>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Builds every shared component from a freshly-parsed `GatewayConfig`
    /// and registers the two rebuilders (spec §4.7) on the config store.
    pub async fn new(config: ConfigStore) -> Result<Self, crate::errors::AppError> {
        let config = Arc::new(config);
        let snapshot = config.get();

        let providers = build_initial_providers(&snapshot)?;

        let handshake_timeout_ms = snapshot
            .whisperx
            .timeout_ms
            .max(snapshot.openai.timeout_ms)
            .max(snapshot.custom.timeout_ms);

        let agent_client = AgentRuntimeClient::new(AgentClientConfig {
            url: snapshot.agent_gateway_url.clone(),
            token: snapshot.agent_gateway_token.clone(),
            handshake_timeout_ms,
        });
        let agent_client = Arc::new(AgentClientHolder::new(agent_client));

        let rate_limiter = RateLimiter::new(config.clone());

        let orchestrator = Arc::new(Orchestrator::new(config.clone(), providers.clone(), agent_client.clone()));

        config
            .on_change(Arc::new(SttProviderRebuilder::new(providers.clone())))
            .await;
        config
            .on_change(Arc::new(AgentClientRebuilder::new(agent_client.clone(), handshake_timeout_ms)))
            .await;

        Ok(AppState {
            config,
            providers,
            agent_client,
            rate_limiter,
            orchestrator,
        })
    }

    /// Disconnects the *current* agent client (spec §5 graceful shutdown):
    /// reads through the holder, not a captured reference, so a rebuild
    /// that happened after startup is what actually gets drained.
    pub async fn shutdown(&self) {
        self.agent_client.get().disconnect().await;
    }
}
