//! Shared server state: the engine components wired together.

use anyhow::{Context, Result};
use skillswap_core::{
    Conversations, Dispatcher, MatchService, MemoryStore, MessageRelay, PresenceRegistry, Router,
    RouterConfig, Stores, TypingTracker,
};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Shared server state.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Realtime event entry point; owns router, presence, typing and relay.
    pub dispatcher: Arc<Dispatcher>,
    pub matches: Arc<MatchService>,
    pub conversations: Conversations,
}

impl AppState {
    /// Wire the engine over the given stores.
    #[must_use]
    pub fn new(config: Config, stores: Stores) -> Self {
        let router = Arc::new(Router::with_config(RouterConfig {
            max_connections: config.limits.max_connections,
            max_subscriptions_per_connection: config.limits.max_subscriptions_per_connection,
            auto_delete_empty_channels: true,
        }));
        let timeout = config.store_timeout();

        let presence = Arc::new(PresenceRegistry::new(Arc::clone(&router)));
        let typing = Arc::new(TypingTracker::new(Arc::clone(&router), config.typing_ttl()));
        let relay = Arc::new(MessageRelay::new(
            Arc::clone(&router),
            stores.clone(),
            timeout,
            config.limits.max_content_length,
        ));
        let matches = Arc::new(MatchService::new(stores.clone(), timeout));
        let dispatcher = Arc::new(Dispatcher::new(
            router,
            presence,
            typing,
            relay,
            Arc::clone(&matches),
            config.limits.max_content_length,
        ));

        Self {
            conversations: Conversations::new(stores, timeout),
            config,
            dispatcher,
            matches,
        }
    }

    /// Build state backed by the in-memory store, seeded if configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed file cannot be loaded.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = match &config.store.seed_path {
            Some(path) => MemoryStore::from_seed_file(path)
                .with_context(|| format!("Failed to load seed {}", path.display()))?,
            None => {
                info!("No seed configured, starting with an empty store");
                MemoryStore::new()
            }
        };
        Ok(Self::new(config, Stores::memory(Arc::new(store))))
    }
}
