pub mod config;
pub mod provision;
pub mod proxy;
pub mod wait;

use std::path::PathBuf;

use kubetunnel_core::{BridgeConfig, ConfigStore};

/// Which cluster to talk to, from the global flags.
pub struct ClusterTarget {
    pub context: Option<String>,
    pub namespace: Option<String>,
    pub kubectl: Option<PathBuf>,
}

/// Stored settings, or the defaults when there is no home directory.
pub async fn load_settings() -> kubetunnel_core::Result<BridgeConfig> {
    match ConfigStore::new() {
        Ok(store) => store.load().await,
        Err(_) => Ok(BridgeConfig::default()),
    }
}
