//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchRegistry;
use crate::lobby::LobbyManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub match_registry: Arc<MatchRegistry>,
    pub lobbies: Arc<LobbyManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Rooms and memberships, shared with the lobby service
        let match_registry = Arc::new(MatchRegistry::new());

        let lobbies = Arc::new(LobbyManager::new(match_registry.clone()));

        Self {
            config,
            match_registry,
            lobbies,
        }
    }
}
