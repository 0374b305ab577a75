//! REST adapter for the block storage API
//!
//! Volumes live under `/v1/volumes`, servers under `/v1/servers`. Requests
//! authenticate with a bearer token; failed calls carry a JSON body of the
//! form `{"detail": "..."}` which is surfaced verbatim in
//! [`ApiError::Response`] so the controller can inspect it.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::api::{Server, ServerApi, Volume, VolumeApi, VolumeFilter, VolumeRequest};
use crate::error::{ApiError, ApiResult};

/// Block storage REST client
pub struct HttpClient {
    base_url: String,
    token: String,
    http_client: reqwest::Client,
}

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

impl HttpClient {
    /// Create a new client
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("blockcsi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            http_client,
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Turn a non-success response into an [`ApiError`]
    async fn check(response: reqwest::Response) -> ApiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status.as_u16(), &body))
    }
}

/// Extract the `detail` message from an error body, falling back to the raw
/// body text.
fn error_from_body(status: u16, body: &str) -> ApiError {
    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.detail,
        Err(_) if body.trim().is_empty() => format!("request failed with status {status}"),
        Err(_) => body.trim().to_string(),
    };
    ApiError::response(status, detail)
}

#[async_trait]
impl VolumeApi for HttpClient {
    async fn list(&self, filter: &VolumeFilter) -> ApiResult<Vec<Volume>> {
        let mut request = self
            .http_client
            .get(self.url("volumes"))
            .bearer_auth(&self.token);
        if let Some(name) = &filter.name {
            request = request.query(&[("name", name)]);
        }

        let response = Self::check(request.send().await?).await?;
        let volumes: Vec<Volume> = response.json().await?;
        debug!(count = volumes.len(), "listed volumes");
        Ok(volumes)
    }

    async fn get(&self, uuid: &str) -> ApiResult<Volume> {
        let response = self
            .http_client
            .get(self.url(&format!("volumes/{uuid}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn create(&self, request: &VolumeRequest) -> ApiResult<Volume> {
        let response = self
            .http_client
            .post(self.url("volumes"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn update(&self, uuid: &str, request: &VolumeRequest) -> ApiResult<()> {
        let response = self
            .http_client
            .patch(self.url(&format!("volumes/{uuid}")))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, uuid: &str) -> ApiResult<()> {
        let response = self
            .http_client
            .delete(self.url(&format!("volumes/{uuid}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ServerApi for HttpClient {
    async fn get(&self, uuid: &str) -> ApiResult<Server> {
        let response = self
            .http_client
            .get(self.url(&format!("servers/{uuid}")))
            .bearer_auth(&self.token)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client =
            HttpClient::new("https://api.example.com/", "token", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
        assert_eq!(
            client.url("volumes/abc"),
            "https://api.example.com/v1/volumes/abc"
        );
    }

    #[test]
    fn test_error_from_json_body() {
        let err = error_from_body(
            400,
            r#"{"detail": "Due to internal limitations, it is currently not possible to attach more than 128 volumes to a server."}"#,
        );
        match err {
            ApiError::Response { status, detail } => {
                assert_eq!(status, 400);
                assert!(detail.starts_with("Due to internal limitations"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_plain_body() {
        let err = error_from_body(404, "Not found.\n");
        assert!(err.is_not_found());
        assert_eq!(err, ApiError::not_found("Not found."));

        let err = error_from_body(502, "");
        assert_eq!(err, ApiError::response(502, "request failed with status 502"));
    }
}
