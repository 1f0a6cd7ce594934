use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

pub use listcore::config::ListConfig;

/// Read a JSON [`ListConfig`] from `path`. Missing keys take their defaults.
pub async fn load_config(path: impl AsRef<Path>) -> Result<ListConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = ListConfig::from_json(&raw)
        .with_context(|| format!("Invalid config file {}", path.display()))?;
    log::debug!("Loaded list config from {}: {config:?}", path.display());
    Ok(config)
}

/// Like [`load_config`], but falls back to defaults when `path` is `None`.
pub async fn load_or_default(path: Option<&Path>) -> Result<ListConfig> {
    match path {
        Some(path) => load_config(path).await,
        None => Ok(ListConfig::default()),
    }
}
