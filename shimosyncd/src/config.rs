use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// User settings, stored as a small JSON document next to the binary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(rename = "Cookie")]
    pub cookie: String,
    #[serde(rename = "Path", default)]
    pub path: PathBuf,
    #[serde(rename = "Folder", default)]
    pub folder: String,
    /// Unix seconds of the last complete sync.
    #[serde(rename = "Lasttime", default)]
    pub last_time: i64,
    /// Milliseconds between remote requests.
    #[serde(rename = "Sleep", default)]
    pub sleep_ms: u64,
    #[serde(rename = "Retry", default)]
    pub retry: u32,
    #[serde(rename = "Recursive", default)]
    pub recursive: bool,
}

impl SyncConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.sleep_ms)
    }

    /// Items modified at or before the watermark were covered by a previous run.
    pub fn is_before_watermark(&self, modified: OffsetDateTime) -> bool {
        modified.unix_timestamp() <= self.last_time
    }
}

pub fn load_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: SyncConfig =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    if let Some(home) = dirs::home_dir() {
        config.path = expand_with_home(&config.path.to_string_lossy(), &home);
    }
    Ok(config)
}

/// Shared, swappable view of the current [`SyncConfig`].
#[derive(Clone)]
pub struct ConfigHandle {
    rx: watch::Receiver<Arc<SyncConfig>>,
}

impl ConfigHandle {
    pub fn new(config: SyncConfig) -> (Self, watch::Sender<Arc<SyncConfig>>) {
        let (tx, rx) = watch::channel(Arc::new(config));
        (Self { rx }, tx)
    }

    pub fn snapshot(&self) -> Arc<SyncConfig> {
        self.rx.borrow().clone()
    }
}

pub struct ConfigWatcher {
    path: PathBuf,
    last_modified: Option<SystemTime>,
    tx: watch::Sender<Arc<SyncConfig>>,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, tx: watch::Sender<Arc<SyncConfig>>) -> Self {
        let last_modified = modified_time(&path);
        Self {
            path,
            last_modified,
            tx,
        }
    }

    /// Reloads the config when the file's mtime moved forward. Returns whether a
    /// new snapshot was published.
    pub async fn poll_once(&mut self) -> bool {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => match meta.modified() {
                Ok(modified) => modified,
                Err(err) => {
                    warn!(path = %self.path.display(), "config mtime unavailable: {err}");
                    return false;
                }
            },
            Err(err) => {
                warn!(path = %self.path.display(), "failed to stat config: {err}");
                return false;
            }
        };
        if self.last_modified.is_some_and(|seen| modified <= seen) {
            return false;
        }

        match load_config(&self.path) {
            Ok(config) => {
                info!(path = %self.path.display(), "config changed, reloading");
                self.last_modified = Some(modified);
                self.tx.send_replace(Arc::new(config));
                true
            }
            Err(err) => {
                warn!("config reload failed, keeping previous settings: {err}");
                false
            }
        }
    }

    pub async fn run(mut self, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            self.poll_once().await;
        }
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

pub(crate) fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "Cookie": "sid=abc",
        "Path": "/data/shimo",
        "Folder": "root-guid",
        "Lasttime": 1700000000,
        "Sleep": 500,
        "Retry": 3,
        "Recursive": true
    }"#;

    #[test]
    fn parses_config_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.cookie, "sid=abc");
        assert_eq!(config.path, PathBuf::from("/data/shimo"));
        assert_eq!(config.folder, "root-guid");
        assert_eq!(config.last_time, 1_700_000_000);
        assert_eq!(config.request_delay(), Duration::from_millis(500));
        assert_eq!(config.retry, 3);
        assert!(config.recursive);
    }

    #[test]
    fn optional_keys_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "Cookie": "sid=abc" }"#).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.retry, 0);
        assert_eq!(config.last_time, 0);
        assert!(!config.recursive);
        assert!(config.folder.is_empty());
    }

    #[test]
    fn rejects_malformed_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            load_config(&dir.path().join("missing.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn watermark_is_inclusive() {
        let config: SyncConfig =
            serde_json::from_str(r#"{ "Cookie": "c", "Lasttime": 1000 }"#).unwrap();
        let at = OffsetDateTime::from_unix_timestamp(1000).unwrap();
        let after = OffsetDateTime::from_unix_timestamp(1001).unwrap();
        assert!(config.is_before_watermark(at));
        assert!(!config.is_before_watermark(after));
    }

    #[test]
    fn expands_tilde_paths() {
        let home = Path::new("/home/u");
        assert_eq!(expand_with_home("~", home), PathBuf::from("/home/u"));
        assert_eq!(expand_with_home("~/Docs", home), PathBuf::from("/home/u/Docs"));
        assert_eq!(expand_with_home("/abs", home), PathBuf::from("/abs"));
    }

    #[tokio::test]
    async fn watcher_publishes_snapshot_when_mtime_advances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let epoch = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(epoch)
            .unwrap();

        let (handle, tx) = ConfigHandle::new(load_config(&path).unwrap());
        let mut watcher = ConfigWatcher::new(path.clone(), tx);
        assert!(!watcher.poll_once().await);

        std::fs::write(&path, SAMPLE.replace("\"Retry\": 3", "\"Retry\": 9")).unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(epoch + Duration::from_secs(60))
            .unwrap();

        assert!(watcher.poll_once().await);
        assert_eq!(handle.snapshot().retry, 9);
        assert!(!watcher.poll_once().await);
    }

    #[tokio::test]
    async fn watcher_keeps_previous_snapshot_on_bad_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let epoch = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(epoch)
            .unwrap();

        let (handle, tx) = ConfigHandle::new(load_config(&path).unwrap());
        let mut watcher = ConfigWatcher::new(path.clone(), tx);

        std::fs::write(&path, "{ broken").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(epoch + Duration::from_secs(60))
            .unwrap();

        assert!(!watcher.poll_once().await);
        assert_eq!(handle.snapshot().retry, 3);
    }
}
