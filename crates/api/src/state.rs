use std::sync::Arc;

use reel_pipeline::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: the orchestrator's registry, hub and history store are
/// all behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Owns every run and implements the control operations.
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: ServerConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
        }
    }
}
