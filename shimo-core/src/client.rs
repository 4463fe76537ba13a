use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://shimo.im";
const FOLDER_REFERER_PATH: &str = "/folder/123";
const DESKTOP_REFERER_PATH: &str = "/desktop";

/// Export error code the API uses for "too many requests".
pub const RATE_LIMIT_ERROR_CODE: i64 = 110002;

#[derive(Debug, Error)]
pub enum ShimoError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Headers the raw file transfer must carry to be accepted by the CDN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHeaders {
    pub cookie: String,
    pub referer: String,
}

#[derive(Clone)]
pub struct ShimoClient {
    http: Client,
    base_url: Url,
    cookie: String,
}

impl ShimoClient {
    pub fn new(cookie: impl Into<String>) -> Result<Self, ShimoError> {
        Self::with_base_url(DEFAULT_BASE_URL, cookie)
    }

    pub fn with_base_url(base_url: &str, cookie: impl Into<String>) -> Result<Self, ShimoError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            cookie: cookie.into(),
        })
    }

    /// Same connection pool and base url, different credentials.
    pub fn with_cookie(&self, cookie: impl Into<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            cookie: cookie.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Lists the direct children of `folder`, or of the desktop when `None`.
    pub async fn list_files(&self, folder: Option<&str>) -> Result<Vec<Item>, ShimoError> {
        let folder = folder.filter(|f| !f.is_empty());
        let mut url = self.endpoint("/lizard-api/files")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("collaboratorCount", "true");
            if let Some(folder) = folder {
                query.append_pair("folder", folder);
            }
        }
        let referer = if folder.is_some() {
            self.folder_referer()?
        } else {
            self.desktop_referer()?
        };
        let response = self
            .http
            .get(url)
            .header("Cookie", &self.cookie)
            .header("Referer", referer.as_str())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn list_comments(&self, guid: &str) -> Result<Vec<Comment>, ShimoError> {
        let url = self.endpoint(&format!("/lizard-api/files/{guid}/comments"))?;
        let response = self
            .http
            .get(url)
            .header("Cookie", &self.cookie)
            .header("Referer", self.folder_referer()?.as_str())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Requests a synchronous export of `guid` into the `ext` format.
    ///
    /// The body is decoded regardless of the HTTP status: rate-limit and other
    /// export failures are reported as JSON error payloads.
    pub async fn export(
        &self,
        guid: &str,
        ext: &str,
        name: &str,
    ) -> Result<ExportResponse, ShimoError> {
        let mut url = self.endpoint(&format!("/lizard-api/files/{guid}/export"))?;
        url.query_pairs_mut()
            .append_pair("type", ext)
            .append_pair("file", guid)
            .append_pair("name", name)
            .append_pair("returnJson", "1")
            .append_pair("isAsync", "0");
        let response = self
            .http
            .get(url)
            .header("Cookie", &self.cookie)
            .header("Referer", self.folder_referer()?.as_str())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| {
            if status.is_success() {
                ShimoError::Decode(err)
            } else {
                ShimoError::Api { status, body }
            }
        })
    }

    pub fn direct_download_url(&self, guid: &str) -> Result<Url, ShimoError> {
        self.endpoint(&format!("/lizard-api/files/{guid}/download"))
    }

    pub fn session_headers(&self) -> Result<SessionHeaders, ShimoError> {
        Ok(SessionHeaders {
            cookie: self.cookie.clone(),
            referer: self.folder_referer()?.to_string(),
        })
    }

    fn folder_referer(&self) -> Result<Url, ShimoError> {
        self.endpoint(FOLDER_REFERER_PATH)
    }

    fn desktop_referer(&self) -> Result<Url, ShimoError> {
        self.endpoint(DESKTOP_REFERER_PATH)
    }

    fn endpoint(&self, path: &str) -> Result<Url, ShimoError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ShimoError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ShimoError::Api { status, body })
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Item {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub item_type: String,
    pub guid: String,
    #[serde(rename = "is_folder", alias = "isFolder", default)]
    pub is_folder: bool,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub target_guid: String,
    #[serde(default)]
    pub comment_guid: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub selection_guid: String,
    #[serde(default)]
    pub selection_content: String,
    #[serde(default)]
    pub reply_to: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(rename = "User", default)]
    pub user: CommentUser,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CommentUser {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

/// Loosely typed export reply; the API mixes several shapes in one object.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExportResponse {
    #[serde(rename = "redirectUrl", default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ExportResponse {
    /// The redirect field wins over the nested `data.downloadUrl`.
    pub fn download_url(&self) -> Option<&str> {
        if let Some(url) = self.redirect_url.as_deref() {
            return Some(url);
        }
        self.data
            .as_ref()
            .and_then(|data| data.get("downloadUrl"))
            .and_then(|url| url.as_str())
    }

    pub fn error_code(&self) -> Option<i64> {
        let code = self.error_code.as_ref()?;
        code.as_i64()
            .or_else(|| code.as_f64().map(|v| v as i64))
            .or_else(|| code.as_str().and_then(|s| s.trim().parse().ok()))
    }

    pub fn is_rate_limited(&self) -> bool {
        self.error_code() == Some(RATE_LIMIT_ERROR_CODE)
    }
}
