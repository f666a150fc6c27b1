//! `ConfigStore`: an `ArcSwap`-backed immutable snapshot with serialized,
//! validated updates and async listener fan-out (spec §4.1).
//!
//! Wraps shared mutable config state behind an atomic pointer swap rather
//! than a lock readers must contend on; writers still serialize under a
//! guard mutex purely to order concurrent mutators while reads stay
//! lock-free, the same shape `core/realtime/openai/client.rs` uses for its
//! own shared state.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use super::{GatewayConfig, SafeConfig, SettingsPatch};
use crate::errors::AppError;

/// Notified, in registration order, after every successful `update()`.
/// Implementors rebuild whatever they own (an STT provider, the
/// agent-runtime client) from the new snapshot; failures are logged by the
/// caller but never roll back the config swap. `patch` is the validated
/// patch that produced `new_config`, so a listener can tell whether the
/// section it cares about actually changed and no-op otherwise.
#[async_trait]
pub trait ConfigChangeListener: Send + Sync {
    async fn on_change(&self, patch: &SettingsPatch, new_config: &Arc<GatewayConfig>);
}

/// Holds the current `GatewayConfig` behind an `ArcSwap` so readers (every
/// request handler, the orchestrator) get a consistent snapshot with no
/// locking, while `update()` validates, merges, swaps, and fans the new
/// snapshot out to listeners — serially, in registration order, under a
/// single async mutex so concurrent `PATCH /api/settings` calls can't
/// interleave their listener notifications.
pub struct ConfigStore {
    current: ArcSwap<GatewayConfig>,
    listeners: AsyncMutex<Vec<Arc<dyn ConfigChangeListener>>>,
    update_lock: AsyncMutex<()>,
}

impl ConfigStore {
    pub fn new(initial: GatewayConfig) -> Self {
        ConfigStore {
            current: ArcSwap::from_pointee(initial),
            listeners: AsyncMutex::new(Vec::new()),
            update_lock: AsyncMutex::new(()),
        }
    }

    /// Current snapshot. Cheap: an `Arc` clone off the swap pointer.
    pub fn get(&self) -> Arc<GatewayConfig> {
        self.current.load_full()
    }

    pub fn get_safe(&self) -> SafeConfig {
        SafeConfig::from(self.get().as_ref())
    }

    /// Register a listener to be notified after every future `update()`.
    /// Does not replay the current snapshot; callers build the initial STT
    /// provider / agent client directly from `get()` at startup.
    pub async fn on_change(&self, listener: Arc<dyn ConfigChangeListener>) {
        self.listeners.lock().await.push(listener);
    }

    /// Validate `patch` against the current snapshot, deep-merge it, swap
    /// it in, and notify listeners serially in registration order. Returns
    /// the new snapshot on success; the swap never happens if validation or
    /// merge construction fails.
    pub async fn update(&self, patch: &SettingsPatch) -> Result<Arc<GatewayConfig>, AppError> {
        let _guard = self.update_lock.lock().await;

        let merged = self.get().apply_patch(patch)?;
        let next = Arc::new(merged);
        self.current.store(next.clone());

        let listeners = self.listeners.lock().await;
        for listener in listeners.iter() {
            listener.on_change(patch, &next).await;
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::config::validate_settings_patch;
    use crate::ids::{ProviderId, SessionKey};
    use crate::secret::Secret;

    fn sample_config() -> GatewayConfig {
        GatewayConfig {
            agent_gateway_url: "wss://agent.test/ws".to_string(),
            agent_gateway_token: Secret::new("tok"),
            agent_session_key: SessionKey::new("sess").unwrap(),
            stt_provider: ProviderId::Whisperx,
            whisperx: Default::default(),
            openai: Default::default(),
            custom: Default::default(),
            server: Default::default(),
        }
    }

    struct CountingListener(Arc<AtomicUsize>);

    #[async_trait]
    impl ConfigChangeListener for CountingListener {
        async fn on_change(&self, _patch: &SettingsPatch, _new_config: &Arc<GatewayConfig>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn update_swaps_snapshot_and_notifies_listeners() {
        let store = ConfigStore::new(sample_config());
        let count = Arc::new(AtomicUsize::new(0));
        store
            .on_change(Arc::new(CountingListener(count.clone())))
            .await;

        let patch = validate_settings_patch(&json!({"whisperx": {"model": "large-v2"}})).unwrap();
        let updated = store.update(&patch).await.unwrap();

        assert_eq!(updated.whisperx.model, "large-v2");
        assert_eq!(store.get().whisperx.model, "large-v2");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_validation_never_swaps() {
        let store = ConfigStore::new(sample_config());
        let bad = validate_settings_patch(&json!({"server": {"port": 0}}));
        assert!(bad.is_ok());
        // apply_patch itself can't fail on a well-typed patch today, but a
        // SessionKey rejection demonstrates the no-partial-swap guarantee.
        let patch = SettingsPatch {
            agent_session_key: Some(String::new()),
            ..Default::default()
        };
        // Bypass validate_settings_patch (which would already reject the
        // empty string) to exercise apply_patch's own validation path.
        let result = store.get().apply_patch(&patch);
        assert!(result.is_err());
        assert_eq!(store.get().agent_session_key.as_str(), "sess");
    }

    #[tokio::test]
    async fn get_safe_never_exposes_secrets() {
        let store = ConfigStore::new(sample_config());
        let safe = store.get_safe();
        assert_eq!(safe.agent_gateway_token, crate::secret::MASKED);
    }
}
