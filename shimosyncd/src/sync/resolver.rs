use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use shimo_core::{ExportResponse, Item, ShimoClient, ShimoError};
use thiserror::Error;
use tracing::{debug, warn};

use super::paths::is_direct_download_type;

static WAIT_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid wait pattern"));

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("export request failed: {0}")]
    Api(#[from] ShimoError),
    #[error("export rate limited: {message}")]
    RateLimited {
        message: String,
        wait: Option<Duration>,
    },
    #[error("no download link found in response")]
    NoDownloadLink,
}

/// Returns a URL the transfer client can fetch for `item`, exported as `ext`.
///
/// Rate-limited exports sleep for the wait the server asks for, then fail so
/// the caller's retry loop makes the next attempt.
pub async fn resolve_download_url(
    client: &ShimoClient,
    item: &Item,
    ext: &str,
) -> Result<String, ResolveError> {
    if is_direct_download_type(&item.item_type) {
        return Ok(client.direct_download_url(&item.guid)?.to_string());
    }

    let response = client.export(&item.guid, ext, &item.name).await?;
    match interpret_export(response) {
        Err(ResolveError::RateLimited { message, wait }) => {
            match wait {
                Some(wait) => {
                    warn!(name = %item.name, wait_secs = wait.as_secs_f64(), "export rate limited, waiting");
                    tokio::time::sleep(wait).await;
                }
                None => warn!(name = %item.name, "export rate limited without a wait hint"),
            }
            Err(ResolveError::RateLimited { message, wait })
        }
        other => other,
    }
}

fn interpret_export(response: ExportResponse) -> Result<String, ResolveError> {
    if let Some(url) = response.download_url() {
        debug!(url, "export produced download url");
        return Ok(url.to_string());
    }
    if response.is_rate_limited() {
        let message = response.error.unwrap_or_default();
        let wait = parse_wait(&message);
        return Err(ResolveError::RateLimited { message, wait });
    }
    Err(ResolveError::NoDownloadLink)
}

/// Pulls the first number out of a human-readable rate-limit message and reads
/// it as seconds.
pub fn parse_wait(message: &str) -> Option<Duration> {
    let found = WAIT_SECONDS.find(message)?;
    let secs: f64 = found.as_str().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(item_type: &str) -> Item {
        Item {
            name: "Budget 2024".into(),
            item_type: item_type.into(),
            guid: "g-1".into(),
            is_folder: false,
            updated_at: "2024-05-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn parses_wait_from_captured_messages() {
        assert_eq!(
            parse_wait("操作过于频繁，请 30 秒后再试"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_wait("导出次数过多，请在12秒后重试"),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            parse_wait("Too many requests, retry in 1.5 seconds"),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn missing_number_means_no_wait() {
        assert_eq!(parse_wait("操作过于频繁，请稍后再试"), None);
        assert_eq!(parse_wait(""), None);
    }

    #[test]
    fn rate_limit_without_hint_fails_immediately() {
        let response: ExportResponse = serde_json::from_value(json!({
            "errorCode": 110002,
            "error": "请稍后再试"
        }))
        .unwrap();
        assert!(matches!(
            interpret_export(response),
            Err(ResolveError::RateLimited { wait: None, .. })
        ));
    }

    #[test]
    fn unknown_shape_is_a_hard_failure() {
        let response: ExportResponse =
            serde_json::from_value(json!({ "errorCode": 500, "error": "boom" })).unwrap();
        let err = interpret_export(response).unwrap_err();
        assert!(matches!(err, ResolveError::NoDownloadLink));
        assert_eq!(err.to_string(), "no download link found in response");
    }

    #[tokio::test]
    async fn direct_types_skip_the_export_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lizard-api/files/g-1/export"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = ShimoClient::with_base_url(&server.uri(), "sid=abc").unwrap();
        let url = resolve_download_url(&client, &item("pdf"), "pdf")
            .await
            .unwrap();
        assert_eq!(url, format!("{}/lizard-api/files/g-1/download", server.uri()));
    }

    #[tokio::test]
    async fn exported_types_use_the_export_reply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lizard-api/files/g-1/export"))
            .and(query_param("type", "xlsx"))
            .and(query_param("name", "Budget 2024"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "downloadUrl": "https://cdn.example/budget.xlsx" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ShimoClient::with_base_url(&server.uri(), "sid=abc").unwrap();
        let url = resolve_download_url(&client, &item("sheet"), "xlsx")
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example/budget.xlsx");
    }

    #[tokio::test]
    async fn rate_limited_export_reports_wait() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/lizard-api/files/g-1/export"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errorCode": 110002,
                "error": "操作过于频繁，请 0 秒后再试"
            })))
            .mount(&server)
            .await;

        let client = ShimoClient::with_base_url(&server.uri(), "sid=abc").unwrap();
        let err = resolve_download_url(&client, &item("newdoc"), "docx")
            .await
            .unwrap_err();
        match err {
            ResolveError::RateLimited { wait, .. } => assert_eq!(wait, Some(Duration::ZERO)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
