//! Persisted user configuration.
//!
//! Stores configuration in JSON format at `~/.kubetunnel/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::ProxyImages;
use crate::error::{Error, Result};

/// Registry the proxy images are pulled from unless configured otherwise.
pub const DEFAULT_IMAGE_REGISTRY: &str = "docker.io/kubetunnel";

/// Configuration data stored in JSON format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Registry prefix of the proxy images.
    #[serde(default = "default_image_registry")]
    pub image_registry: String,

    /// Tag of the proxy images.
    #[serde(default = "default_image_version")]
    pub image_version: String,

    /// Explicit kubectl / oc binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubectl_path: Option<PathBuf>,

    /// Bound on `rollout status` for DeploymentConfigs.
    #[serde(default = "default_rollout_timeout")]
    pub rollout_timeout_secs: u64,

    #[serde(default = "default_ssh_wait_timeout")]
    pub ssh_wait_timeout_secs: u64,

    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_secs: u64,
}

fn default_image_registry() -> String {
    DEFAULT_IMAGE_REGISTRY.to_string()
}

fn default_image_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_rollout_timeout() -> u64 {
    300
}

fn default_ssh_wait_timeout() -> u64 {
    30
}

fn default_readiness_timeout() -> u64 {
    30
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            image_registry: default_image_registry(),
            image_version: default_image_version(),
            kubectl_path: None,
            rollout_timeout_secs: default_rollout_timeout(),
            ssh_wait_timeout_secs: default_ssh_wait_timeout(),
            readiness_timeout_secs: default_readiness_timeout(),
        }
    }
}

impl BridgeConfig {
    pub fn images(&self) -> ProxyImages {
        ProxyImages::new(&self.image_registry, &self.image_version)
    }

    pub fn rollout_timeout(&self) -> Duration {
        Duration::from_secs(self.rollout_timeout_secs)
    }

    pub fn ssh_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh_wait_timeout_secs)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Set one field by its file key. An empty `kubectlPath` clears it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "imageRegistry" => self.image_registry = required(key, value)?,
            "imageVersion" => self.image_version = required(key, value)?,
            "kubectlPath" => {
                self.kubectl_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "rolloutTimeoutSecs" => self.rollout_timeout_secs = seconds(key, value)?,
            "sshWaitTimeoutSecs" => self.ssh_wait_timeout_secs = seconds(key, value)?,
            "readinessTimeoutSecs" => self.readiness_timeout_secs = seconds(key, value)?,
            _ => {
                return Err(Error::Config(format!(
                    "Unknown setting {:?}, expected one of: {}",
                    key,
                    SETTINGS.join(", ")
                )))
            }
        }
        Ok(())
    }
}

/// Keys accepted by [`BridgeConfig::set`].
pub const SETTINGS: &[&str] = &[
    "imageRegistry",
    "imageVersion",
    "kubectlPath",
    "rolloutTimeoutSecs",
    "sshWaitTimeoutSecs",
    "readinessTimeoutSecs",
];

fn required(key: &str, value: &str) -> Result<String> {
    if value.trim().is_empty() {
        return Err(Error::Config(format!("{} cannot be empty", key)));
    }
    Ok(value.trim().to_string())
}

fn seconds(key: &str, value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(Error::Config(format!(
            "{} must be a positive number of seconds, got {:?}",
            key, value
        ))),
    }
}

/// Configuration store backed by a JSON file.
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.kubetunnel/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        Ok(Self {
            config_path: home.join(".kubetunnel").join("config.json"),
        })
    }

    /// Create a config store with a custom path (for testing).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load configuration from disk.
    ///
    /// Returns default config if the file doesn't exist.
    pub async fn load(&self) -> Result<BridgeConfig> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            return Ok(BridgeConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Write `config` through a sibling temp file renamed over the target.
    pub async fn save(&self, config: &BridgeConfig) -> Result<()> {
        let path = &self.config_path;
        let io_failure =
            |step: &str, e: std::io::Error| Error::Config(format!("{} {}: {}", step, path.display(), e));

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| io_failure("Cannot create the directory of", e))?;
        }

        let content = serde_json::to_vec_pretty(config)?;
        let staged = path.with_extension("json.tmp");
        let mut file = fs::File::create(&staged)
            .await
            .map_err(|e| io_failure("Cannot stage", e))?;
        file.write_all(&content)
            .await
            .map_err(|e| io_failure("Cannot write", e))?;
        file.sync_all()
            .await
            .map_err(|e| io_failure("Cannot flush", e))?;

        fs::rename(&staged, path)
            .await
            .map_err(|e| io_failure("Cannot replace", e))
    }

    /// Load, apply `change`, and save. Nothing is written when `change` fails.
    pub async fn update<F>(&self, change: F) -> Result<BridgeConfig>
    where
        F: FnOnce(&mut BridgeConfig) -> Result<()>,
    {
        let mut config = self.load().await?;
        change(&mut config)?;
        self.save(&config).await?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        (ConfigStore::with_path(path), dir)
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _dir) = test_store();
        let config = store.load().await.unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.rollout_timeout(), Duration::from_secs(300));
        assert_eq!(
            config.images().default,
            format!("docker.io/kubetunnel/proxy-k8s:{}", env!("CARGO_PKG_VERSION"))
        );
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (store, _dir) = test_store();

        let saved = store
            .update(|config| {
                config.set("imageRegistry", "registry.internal/kt")?;
                config.set("kubectlPath", "/opt/bin/oc")?;
                config.set("sshWaitTimeoutSecs", "60")
            })
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.ssh_wait_timeout(), Duration::from_secs(60));
        assert!(!store.path().with_extension("json.tmp").exists());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"imageRegistry\": \"registry.internal/kt\""));
        assert!(raw.contains("\"kubectlPath\""));
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let (store, _dir) = test_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), r#"{"rolloutTimeoutSecs": 60}"#).unwrap();

        let config = store.load().await.unwrap();
        assert_eq!(config.rollout_timeout_secs, 60);
        assert_eq!(config.image_registry, DEFAULT_IMAGE_REGISTRY);
        assert_eq!(config.readiness_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let (store, _dir) = test_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        assert!(matches!(store.load().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_rejected_update_writes_nothing() {
        let (store, _dir) = test_store();

        let err = store
            .update(|config| config.set("rolloutTimeoutSecs", "soon"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("rolloutTimeoutSecs")));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_set_fields() {
        let mut config = BridgeConfig::default();

        config.set("readinessTimeoutSecs", " 45 ").unwrap();
        assert_eq!(config.readiness_timeout(), Duration::from_secs(45));

        config.set("kubectlPath", "/usr/bin/oc").unwrap();
        assert_eq!(config.kubectl_path, Some(PathBuf::from("/usr/bin/oc")));
        config.set("kubectlPath", "").unwrap();
        assert_eq!(config.kubectl_path, None);

        assert!(config.set("rolloutTimeoutSecs", "0").is_err());
        assert!(config.set("imageVersion", "  ").is_err());
        let err = config.set("registry", "x").unwrap_err();
        assert!(err.to_string().contains("imageRegistry"));
    }
}
