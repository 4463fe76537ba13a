use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shimo_core::{Item, ShimoClient, ShimoError};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use super::backoff::RetryPolicy;
use super::comments::sync_comments;
use super::convert::{ConvertError, DocumentConverter, PandocConverter};
use super::index::LocalIndex;
use super::paths::{extension_for_type, is_convertible, relative_to_root, sanitize_file_name};
use super::resolver::{ResolveError, resolve_download_url};
use super::transfer::{TransferClient, TransferError};
use crate::config::{ConfigHandle, SyncConfig};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("api error: {0}")]
    Api(#[from] ShimoError),
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
    #[error("convert error: {0}")]
    Convert(#[from] ConvertError),
    #[error("failed to create folder {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed after {attempts} attempts: {name}")]
    RetriesExhausted { name: String, attempts: u32 },
}

/// How a traversal ended. Reaching the watermark stops the whole run, not just
/// the current folder, since listings are ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    WatermarkReached,
}

pub struct SyncEngine {
    client: ShimoClient,
    transfer: TransferClient,
    converter: Arc<dyn DocumentConverter>,
    config: ConfigHandle,
    local: LocalIndex,
}

impl SyncEngine {
    pub fn new(client: ShimoClient, config: ConfigHandle, local: LocalIndex) -> Self {
        Self {
            client,
            transfer: TransferClient::new(),
            converter: Arc::new(PandocConverter::default()),
            config,
            local,
        }
    }

    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Mirrors the remote folder `folder` into `base`, recursing into
    /// subfolders when enabled.
    pub async fn sync(&self, folder: &str, base: &Path) -> Result<SyncOutcome, EngineError> {
        let config = self.config.snapshot();
        tokio::time::sleep(config.request_delay()).await;

        let items = self.api(&config).list_files(Some(folder)).await?;
        debug!(folder, base = %base.display(), items = items.len(), "listed folder");

        for item in &items {
            match self.process_item(item, base).await {
                Ok(SyncOutcome::WatermarkReached) => return Ok(SyncOutcome::WatermarkReached),
                Ok(SyncOutcome::Completed) => {}
                Err(err) => warn!(name = %item.name, guid = %item.guid, "skipping item: {err}"),
            }
        }
        Ok(SyncOutcome::Completed)
    }

    async fn process_item(&self, item: &Item, base: &Path) -> Result<SyncOutcome, EngineError> {
        let config = self.config.snapshot();
        let modified = match parse_modified(&item.updated_at) {
            Ok(modified) => modified,
            Err(err) => {
                warn!(name = %item.name, updated_at = %item.updated_at, "bad timestamp, skipping: {err}");
                return Ok(SyncOutcome::Completed);
            }
        };
        if config.is_before_watermark(modified) {
            info!(name = %item.name, "reached last sync time");
            return Ok(SyncOutcome::WatermarkReached);
        }

        let mut name = sanitize_file_name(&item.name);
        if name.is_empty() {
            name = sanitize_file_name(&item.guid);
        }

        if item.is_folder {
            if !config.recursive {
                debug!(name = %item.name, "recursion disabled, skipping folder");
                return Ok(SyncOutcome::Completed);
            }
            let child = base.join(&name);
            tokio::fs::create_dir_all(&child)
                .await
                .map_err(|source| EngineError::CreateDir {
                    path: child.clone(),
                    source,
                })?;
            return Box::pin(self.sync(&item.guid, &child)).await;
        }

        self.process_document(item, base, &name, modified).await?;
        Ok(SyncOutcome::Completed)
    }

    async fn process_document(
        &self,
        item: &Item,
        base: &Path,
        name: &str,
        modified: OffsetDateTime,
    ) -> Result<(), EngineError> {
        let Some(ext) = extension_for_type(&item.item_type) else {
            warn!(name = %item.name, item_type = %item.item_type, "unsupported document type");
            return Ok(());
        };

        if let Some(local) = self.local_modified(base, name, ext) {
            if modified <= local {
                info!(name, "already up to date");
                return Ok(());
            }
            info!(name, "remote copy is newer, updating");
        }

        let config = self.config.snapshot();
        let policy = RetryPolicy::new(config.retry, config.request_delay());
        for attempt in 0..policy.attempts() {
            if let Some(delay) = policy.delay_before(attempt) {
                info!(name, attempt, "retrying");
                tokio::time::sleep(delay).await;
            }
            let config = self.config.snapshot();
            let api = self.api(&config);
            match self
                .fetch_document(&api, item, base, name, ext, config.request_delay())
                .await
            {
                Ok(()) => {
                    match sync_comments(&api, &item.guid, &base.join(name)).await {
                        Ok(path) => debug!(path = %path.display(), "comments saved"),
                        Err(err) => warn!(name, "failed to sync comments: {err}"),
                    }
                    return Ok(());
                }
                Err(err) => warn!(name, attempt, "failed to fetch document: {err}"),
            }
        }

        Err(EngineError::RetriesExhausted {
            name: name.to_string(),
            attempts: policy.attempts(),
        })
    }

    async fn fetch_document(
        &self,
        api: &ShimoClient,
        item: &Item,
        base: &Path,
        name: &str,
        ext: &str,
        throttle: Duration,
    ) -> Result<(), EngineError> {
        tokio::time::sleep(throttle).await;

        let url = resolve_download_url(api, item, ext).await?;
        let target = base.join(format!("{name}.{ext}"));
        self.transfer
            .download_to_path(&url, &target, &api.session_headers()?)
            .await?;

        if is_convertible(ext) {
            let markdown = base.join(format!("{name}.md"));
            self.converter.to_markdown(&target, &markdown).await?;
            if let Err(err) = tokio::fs::remove_file(&target).await {
                warn!(path = %target.display(), "failed to remove converted source: {err}");
            }
            info!(path = %markdown.display(), "document synced");
        } else {
            info!(path = %target.display(), "document synced");
        }
        Ok(())
    }

    /// Local mtime of the document's mirror. Converted documents are also
    /// matched by their markdown file.
    fn local_modified(&self, base: &Path, name: &str, ext: &str) -> Option<OffsetDateTime> {
        let root = self.local.root();
        let primary = relative_to_root(root, base, &format!("{name}.{ext}"));
        self.local.modified(&primary).or_else(|| {
            if !is_convertible(ext) {
                return None;
            }
            let converted = relative_to_root(root, base, &format!("{name}.md"));
            self.local.modified(&converted)
        })
    }

    fn api(&self, config: &SyncConfig) -> ShimoClient {
        self.client.with_cookie(config.cookie.clone())
    }
}

fn parse_modified(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(value, &Rfc3339)
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
