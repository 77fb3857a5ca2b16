//! Config command - show or change the stored configuration.

use anyhow::Result;
use kubetunnel_core::{domain::OCP_IMAGE_ENV, ConfigStore, ImageOverride};

pub async fn show(json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let config = store.load().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let images = config.images();
    let kubectl = config
        .kubectl_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(auto-detect)".to_string());

    println!("Configuration file: {}", store.path().display());
    println!();
    println!("Images:");
    println!("  default:    {}", images.default);
    println!("  privileged: {}", images.privileged);
    println!("  openshift:  {}", images.openshift);
    println!("  {}: {:?}", OCP_IMAGE_ENV, ImageOverride::from_env());
    println!();
    println!("kubectl:            {}", kubectl);
    println!("Rollout timeout:    {}s", config.rollout_timeout_secs);
    println!("SSH wait timeout:   {}s", config.ssh_wait_timeout_secs);
    println!("Readiness timeout:  {}s", config.readiness_timeout_secs);

    Ok(())
}

pub async fn set(key: &str, value: &str, json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let config = store.update(|config| config.set(key, value)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("Updated {} in {}", key, store.path().display());
    }
    Ok(())
}
