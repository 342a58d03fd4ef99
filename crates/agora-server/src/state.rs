//! Server state management

use agora_core::{build_roster, AgoraConfig, BroadcastHub, DebateManager, Gateway};
use std::path::PathBuf;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<DebateManager>,
    pub hub: Arc<BroadcastHub>,
    pub gateway: Arc<Gateway>,
    /// File re-read by `/api/agents/reload`; `None` means built-in defaults
    pub config_path: Option<PathBuf>,
}

impl AppState {
    /// Build state from a loaded config. Spawns the hub task, so this must
    /// run inside a Tokio runtime.
    pub fn new(config: &AgoraConfig, config_path: Option<PathBuf>) -> Self {
        let roster = build_roster(&config.resolved_agents());
        if roster.is_empty() {
            tracing::warn!("No usable agents configured; debate turns will fail");
        }

        Self {
            manager: Arc::new(DebateManager::new(roster)),
            hub: BroadcastHub::spawn(),
            gateway: Arc::new(Gateway::from_config(config)),
            config_path,
        }
    }
}
