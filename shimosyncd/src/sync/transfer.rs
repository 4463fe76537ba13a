use std::{
    io,
    path::{Path, PathBuf},
};

use futures_util::StreamExt;
use reqwest::Client;
use shimo_core::SessionHeaders;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Clone, Default)]
pub struct TransferClient {
    http: Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams `href` into `target`, authenticating with the session headers.
    /// The body goes to a `.partial` sibling first so a failed transfer never
    /// leaves a truncated file under the final name.
    pub async fn download_to_path(
        &self,
        href: &str,
        target: &Path,
        session: &SessionHeaders,
    ) -> Result<(), TransferError> {
        let url = Url::parse(href)?;
        let response = self
            .http
            .get(url)
            .header("Cookie", &session.cookie)
            .header("Referer", &session.referer)
            .send()
            .await?
            .error_for_status()?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        if let Err(err) = write_body(response, &partial, target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
        Ok(())
    }
}

async fn write_body(
    response: reqwest::Response,
    partial: &Path,
    target: &Path,
) -> Result<(), TransferError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(partial, target).await?;
    Ok(())
}

/// Extension of in-flight downloads. The local index never records these.
pub const PARTIAL_EXTENSION: &str = "partial";

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}{PARTIAL_EXTENSION}",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
