use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shimo_core::{Comment, ShimoClient, ShimoError};
use thiserror::Error;

pub const COMMENTS_FILE_NAME: &str = "comments.json";

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("failed to fetch comments: {0}")]
    Api(#[from] ShimoError),
    #[error("failed to encode comments: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write comments: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentGroup {
    pub selection_guid: String,
    pub selection_content: String,
    pub comments: Vec<CommentEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    pub comment_guid: String,
    pub content: String,
    pub name: String,
    pub reply_to: String,
}

impl From<&Comment> for CommentEntry {
    fn from(comment: &Comment) -> Self {
        Self {
            comment_guid: comment.comment_guid.clone(),
            content: comment.content.clone(),
            name: comment.user.name.clone(),
            reply_to: comment.reply_to.clone(),
        }
    }
}

/// Groups comments by the selection they annotate. Comments without a
/// selection are dropped. Groups come out in first-seen order and keep the
/// source order of their comments.
pub fn group_comments(comments: &[Comment]) -> Vec<CommentGroup> {
    let mut groups: Vec<CommentGroup> = Vec::new();
    let mut by_selection: HashMap<&str, usize> = HashMap::new();

    for comment in comments {
        let selection = comment.selection_guid.as_str();
        if selection.is_empty() {
            continue;
        }
        let slot = *by_selection.entry(selection).or_insert_with(|| {
            groups.push(CommentGroup {
                selection_guid: selection.to_string(),
                selection_content: comment.selection_content.clone(),
                comments: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].comments.push(CommentEntry::from(comment));
    }

    groups
}

/// Fetches the comments of `guid` and rewrites `<doc_dir>/comments.json`.
/// Returns the written path.
pub async fn sync_comments(
    client: &ShimoClient,
    guid: &str,
    doc_dir: &Path,
) -> Result<PathBuf, CommentError> {
    let comments = client.list_comments(guid).await?;
    let groups = group_comments(&comments);
    let payload = serde_json::to_vec_pretty(&groups)?;

    tokio::fs::create_dir_all(doc_dir).await?;
    let target = doc_dir.join(COMMENTS_FILE_NAME);
    tokio::fs::write(&target, payload).await?;
    Ok(target)
}
