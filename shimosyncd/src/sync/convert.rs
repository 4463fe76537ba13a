use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to run converter: {0}")]
    Spawn(#[from] io::Error),
    #[error("converter exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("invalid conversion target: {0}")]
    InvalidTarget(PathBuf),
}

/// Turns a downloaded office document into markdown next to it.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn to_markdown(&self, source: &Path, target: &Path) -> Result<(), ConvertError>;
}

pub struct PandocConverter {
    program: PathBuf,
}

impl PandocConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self::new("pandoc")
    }
}

#[async_trait]
impl DocumentConverter for PandocConverter {
    /// Media is extracted into a directory named after the target's stem,
    /// beside the markdown file.
    async fn to_markdown(&self, source: &Path, target: &Path) -> Result<(), ConvertError> {
        let (dir, file_name, media_dir) = split_target(target)?;
        let source = std::path::absolute(source)?;
        tokio::fs::create_dir_all(dir.join(&media_dir)).await?;

        let output = Command::new(&self.program)
            .current_dir(&dir)
            .arg("-s")
            .arg(&source)
            .args(["-t", "markdown", "-o"])
            .arg(&file_name)
            .arg("--extract-media")
            .arg(&media_dir)
            .output()
            .await?;
        if !output.status.success() {
            return Err(ConvertError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!(target = %target.display(), "converted to markdown");
        Ok(())
    }
}

fn split_target(target: &Path) -> Result<(PathBuf, PathBuf, PathBuf), ConvertError> {
    let invalid = || ConvertError::InvalidTarget(target.to_path_buf());
    let dir = target.parent().ok_or_else(invalid)?.to_path_buf();
    let file_name = PathBuf::from(target.file_name().ok_or_else(invalid)?);
    let media_dir = PathBuf::from(target.file_stem().ok_or_else(invalid)?);
    Ok((dir, file_name, media_dir))
}
