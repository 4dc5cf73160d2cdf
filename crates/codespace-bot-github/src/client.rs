//! HTTP client for the Codespaces REST API.

use std::time::Duration;

use async_trait::async_trait;
use codespace_bot_core::{Codespace, EnvironmentApi, ToggleAction};
use reqwest::{StatusCode, Url, header::ACCEPT};
use serde::Deserialize;
use thiserror::Error;

/// Public GitHub API.
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Upper bound for a single upstream request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";

/// Upstream API error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Unexpected status: {0}")]
    Status(StatusCode),
    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
}

/// Whether a status code counts as success for a toggle.
#[must_use]
pub fn is_success_status(code: u16) -> bool {
    (200..=299).contains(&code)
}

#[derive(Deserialize)]
struct CodespaceList {
    #[serde(default)]
    codespaces: Vec<Codespace>,
}

/// Builder for [`GithubClient`].
#[derive(Debug, Clone)]
pub struct GithubClientBuilder {
    base_url: String,
    timeout: Duration,
}

impl Default for GithubClientBuilder {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GithubClientBuilder {
    /// Override the API base (used against mock servers and GHES).
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Returns error if the base URL does not parse or the HTTP client
    /// cannot be constructed.
    pub fn build(self) -> Result<GithubClient, ApiError> {
        let base_url =
            Url::parse(&self.base_url).map_err(|e| ApiError::BaseUrl(format!("{}: {e}", self.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::BaseUrl(self.base_url));
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("codespace-bot/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(GithubClient { http, base_url })
    }
}

/// Stateless Codespaces client.
///
/// Every call carries its own credential, so one client serves all chats.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GithubClient {
    /// Client for the public API with the default timeout.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, ApiError> {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> GithubClientBuilder {
        GithubClientBuilder::default()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::BaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `GET /user/codespaces`.
    ///
    /// # Errors
    /// Returns error on transport failure, timeout, non-2xx status or a body
    /// that is not a JSON object.
    pub async fn list_codespaces(&self, credential: &str) -> Result<Vec<Codespace>, ApiError> {
        let resp = self
            .http
            .get(self.endpoint(&["user", "codespaces"])?)
            .bearer_auth(credential)
            .header(ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }

        let body = resp.bytes().await?;
        let list: CodespaceList = serde_json::from_slice(&body)?;
        Ok(list.codespaces)
    }

    /// `POST /user/codespaces/{name}/{start|stop}`.
    ///
    /// Returns the upstream status whatever it is; only transport failures
    /// are errors.
    ///
    /// # Errors
    /// Returns error on transport failure or timeout.
    pub async fn post_action(
        &self,
        credential: &str,
        name: &str,
        action: ToggleAction,
    ) -> Result<StatusCode, ApiError> {
        let resp = self
            .http
            .post(self.endpoint(&["user", "codespaces", name, action.as_str()])?)
            .bearer_auth(credential)
            .header(ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;
        Ok(resp.status())
    }
}

#[async_trait]
impl EnvironmentApi for GithubClient {
    async fn list_environments(&self, credential: &str) -> Option<Vec<Codespace>> {
        match self.list_codespaces(credential).await {
            Ok(codespaces) => Some(codespaces),
            Err(e) => {
                tracing::warn!("Codespaces list failed: {e}");
                None
            }
        }
    }

    async fn toggle_environment(
        &self,
        credential: &str,
        name: &str,
        action: ToggleAction,
    ) -> bool {
        match self.post_action(credential, name, action).await {
            Ok(status) if is_success_status(status.as_u16()) => {
                tracing::info!(codespace = name, %action, "Codespace action accepted");
                true
            }
            Ok(status) => {
                tracing::warn!(codespace = name, %action, %status, "Codespace action rejected");
                false
            }
            Err(e) => {
                tracing::warn!(codespace = name, %action, "Codespace action failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GithubClient {
        GithubClient::builder()
            .base_url(server.uri())
            .timeout(Duration::from_millis(300))
            .build()
            .unwrap()
    }

    #[test]
    fn test_success_status_boundaries() {
        assert!(!is_success_status(199));
        assert!(is_success_status(200));
        assert!(is_success_status(204));
        assert!(is_success_status(299));
        assert!(!is_success_status(300));
        assert!(!is_success_status(401));
        assert!(!is_success_status(500));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = GithubClient::builder().base_url("not a url").build();
        assert!(matches!(result, Err(ApiError::BaseUrl(_))));

        tokio_test::assert_ok!(GithubClient::builder().base_url("http://127.0.0.1:9").build());
    }

    #[tokio::test]
    async fn test_list_sends_auth_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/codespaces"))
            .and(header("authorization", "Bearer ghp_valid"))
            .and(header("accept", MEDIA_TYPE))
            .and(header("x-github-api-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"total_count":2,"codespaces":[
                    {"name":"env-1","state":"Available"},
                    {"name":"env-2","state":"Shutdown","display_name":"docs"}
                ]}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let codespaces = client_for(&server).list_environments("ghp_valid").await.unwrap();
        assert_eq!(codespaces.len(), 2);
        assert_eq!(codespaces[0].name, "env-1");
        assert_eq!(codespaces[1].label(), "docs");
    }

    #[tokio::test]
    async fn test_list_empty_is_not_absent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/codespaces"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"codespaces":[]}"#))
            .mount(&server)
            .await;

        let result = client_for(&server).list_environments("ghp_valid").await;
        assert_eq!(result, Some(vec![]));
    }

    #[tokio::test]
    async fn test_list_without_codespaces_key_is_empty() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/codespaces"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let result = client_for(&server).list_environments("ghp_valid").await;
        assert_eq!(result, Some(vec![]));
    }

    #[tokio::test]
    async fn test_list_failures_are_absent() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/user/codespaces"))
            .and(header("authorization", "Bearer ghp_bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user/codespaces"))
            .and(header("authorization", "Bearer ghp_html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/user/codespaces"))
            .and(header("authorization", "Bearer ghp_slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"codespaces":[]}"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.list_environments("ghp_bad").await.is_none());
        assert!(client.list_environments("ghp_html").await.is_none());
        assert!(client.list_environments("ghp_slow").await.is_none());
    }

    #[tokio::test]
    async fn test_list_unreachable_upstream_is_absent() {
        let client = GithubClient::builder()
            .base_url("http://127.0.0.1:1")
            .timeout(Duration::from_millis(300))
            .build()
            .unwrap();
        assert!(client.list_environments("ghp_valid").await.is_none());
    }

    #[tokio::test]
    async fn test_toggle_classifies_status() {
        let server = MockServer::start().await;

        for (name, status) in [("ok-204", 204), ("ok-200", 200), ("redirect", 300), ("missing", 404), ("broken", 500)] {
            Mock::given(method("POST"))
                .and(path(format!("/user/codespaces/{name}/stop")))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let client = client_for(&server);
        assert!(client.toggle_environment("t", "ok-204", ToggleAction::Stop).await);
        assert!(client.toggle_environment("t", "ok-200", ToggleAction::Stop).await);
        assert!(!client.toggle_environment("t", "redirect", ToggleAction::Stop).await);
        assert!(!client.toggle_environment("t", "missing", ToggleAction::Stop).await);
        assert!(!client.toggle_environment("t", "broken", ToggleAction::Stop).await);
    }

    #[tokio::test]
    async fn test_toggle_single_attempt_on_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/user/codespaces/env-1/start"))
            .respond_with(ResponseTemplate::new(202).set_delay(Duration::from_secs(2)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(!client.toggle_environment("t", "env-1", ToggleAction::Start).await);
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = GithubClient::builder()
            .base_url("https://ghe.example.com/api/v3/")
            .build()
            .unwrap();
        let url = client
            .endpoint(&["user", "codespaces", "a b/c", "start"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/user/codespaces/a%20b%2Fc/start"
        );
    }
}
