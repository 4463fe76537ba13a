use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shimo_core::ShimoClient;
use tracing::info;

use crate::config::{ConfigHandle, ConfigWatcher, SyncConfig, load_config};
use crate::sync::convert::PandocConverter;
use crate::sync::engine::{SyncEngine, SyncOutcome};
use crate::sync::index::LocalIndex;

const DEFAULT_CONFIG_FILE: &str = "config.json";
const DEFAULT_BASE_URL: &str = "https://shimo.im";
const DEFAULT_PANDOC: &str = "pandoc";
const DEFAULT_CONFIG_POLL_SECS: u64 = 120;

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub config_path: PathBuf,
    pub reload_interval: Duration,
    pub base_url: String,
    pub pandoc: PathBuf,
}

impl DaemonConfig {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            reload_interval: Duration::from_secs(DEFAULT_CONFIG_POLL_SECS),
            base_url: DEFAULT_BASE_URL.to_string(),
            pandoc: PathBuf::from(DEFAULT_PANDOC),
        }
    }

    pub fn from_env() -> Self {
        let config_path = std::env::var("SHIMO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let reload_interval = Duration::from_secs(read_u64_env(
            "SHIMO_CONFIG_POLL_SECS",
            DEFAULT_CONFIG_POLL_SECS,
        ));
        let base_url =
            std::env::var("SHIMO_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let pandoc = std::env::var("SHIMO_PANDOC")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PANDOC));

        Self {
            config_path,
            reload_interval,
            base_url,
            pandoc,
        }
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    engine: SyncEngine,
    settings: ConfigHandle,
    watcher: ConfigWatcher,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let settings = load_config(&config.config_path)?;
        let root = local_root(&settings);
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create local root at {}", root.display()))?;

        let local = LocalIndex::build(&root);
        info!(root = %root.display(), files = local.len(), "local index ready");

        let client = ShimoClient::with_base_url(&config.base_url, settings.cookie.clone())
            .context("invalid api base url")?;
        let (handle, tx) = ConfigHandle::new(settings);
        let watcher = ConfigWatcher::new(config.config_path.clone(), tx);
        let engine = SyncEngine::new(client, handle.clone(), local)
            .with_converter(Arc::new(PandocConverter::new(&config.pandoc)));

        Ok(Self {
            config,
            engine,
            settings: handle,
            watcher,
        })
    }

    /// Runs one pass from the configured root folder while the config file is
    /// watched for changes.
    pub async fn run(self) -> anyhow::Result<SyncOutcome> {
        let reload_handle = tokio::spawn(self.watcher.run(self.config.reload_interval));

        let settings = self.settings.snapshot();
        let root = local_root(&settings);
        info!(
            root = %root.display(),
            folder = %settings.folder,
            recursive = settings.recursive,
            "sync started"
        );
        let result = self.engine.sync(&settings.folder, &root).await;
        reload_handle.abort();

        let outcome = result.context("sync failed")?;
        match outcome {
            SyncOutcome::Completed => info!("sync pass complete"),
            SyncOutcome::WatermarkReached => info!("reached last sync time, stopping"),
        }
        Ok(outcome)
    }
}

fn local_root(settings: &SyncConfig) -> PathBuf {
    if settings.path.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        settings.path.clone()
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "daemon_tests.rs"]
mod tests;
