// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for paged conversation history.
//!
//! Pages are fetched with
//! `GET {base}/conversations/{id}/messages?limit={n}&cursor={c}` and the
//! response body is a JSON [`HistoryPage`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use tether_config::TetherConfig;
use tether_core::{
    AdapterType, ConversationId, ErrorContext, HealthStatus, HistoryPage, HistorySource,
    PluginAdapter, TetherError,
};

/// Per-request timeout for history fetches.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`HistorySource`] backed by the chat server's REST API.
#[derive(Debug, Clone)]
pub struct HttpHistory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHistory {
    /// Creates a client for `base_url`, sending `auth_token` as a bearer token.
    pub fn new(base_url: impl Into<String>, auth_token: Option<&str>) -> Result<Self, TetherError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TetherError::Config(format!("invalid auth token header value: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TetherError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Builds the client from `[history]`, or `None` when no base URL is configured.
    pub fn from_config(config: &TetherConfig) -> Result<Option<Self>, TetherError> {
        config
            .history
            .base_url
            .as_deref()
            .map(|base| Self::new(base, config.connection.auth_token.as_deref()))
            .transpose()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn page_url(&self, conversation: &ConversationId) -> String {
        format!("{}/conversations/{}/messages", self.base_url, conversation)
    }
}

#[async_trait]
impl PluginAdapter for HttpHistory {
    fn name(&self) -> &str {
        "http-history"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::History
    }

    async fn health_check(&self) -> Result<HealthStatus, TetherError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TetherError> {
        Ok(())
    }
}

#[async_trait]
impl HistorySource for HttpHistory {
    async fn fetch_page(
        &self,
        conversation: &ConversationId,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<HistoryPage, TetherError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let url = reqwest::Url::parse_with_params(&self.page_url(conversation), &query)
            .map_err(|e| TetherError::Config(format!("invalid history url {}: {e}", self.base_url)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TetherError::Connection {
                message: format!("history request failed: {e}"),
                context: ErrorContext::with_code("history_request_failed"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(
            conversation = %conversation,
            cursor = cursor.unwrap_or(""),
            status = %status,
            "history page response received"
        );

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(TetherError::authentication(format!(
                "history request rejected with HTTP {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TetherError::Connection {
                message: format!("history server returned {status}: {body}"),
                context: ErrorContext::with_code("history_http_status")
                    .meta("status", status.as_u16().to_string()),
                source: None,
            });
        }

        response
            .json::<HistoryPage>()
            .await
            .map_err(|e| TetherError::Connection {
                message: format!("failed to parse history page: {e}"),
                context: ErrorContext::with_code("history_decode_failed"),
                source: Some(Box::new(e)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn conv() -> ConversationId {
        ConversationId("conv-9".into())
    }

    #[tokio::test]
    async fn fetches_first_page_with_bearer_token() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "messages": [
                {"id": "m1", "role": "user", "content": "hi", "created_at": "2026-03-01T10:00:00Z"}
            ],
            "next_cursor": "c-2"
        });
        Mock::given(method("GET"))
            .and(path("/api/conversations/conv-9/messages"))
            .and(query_param("limit", "25"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&server)
            .await;

        let history = HttpHistory::new(format!("{}/api/", server.uri()), Some("tok")).unwrap();
        let page = history.fetch_page(&conv(), None, 25).await.unwrap();

        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].content, "hi");
        assert_eq!(page.next_cursor.as_deref(), Some("c-2"));
    }

    #[tokio::test]
    async fn passes_cursor_and_handles_last_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations/conv-9/messages"))
            .and(query_param("cursor", "c-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"messages": []})))
            .mount(&server)
            .await;

        let history = HttpHistory::new(server.uri(), None).unwrap();
        let page = history.fetch_page(&conv(), Some("c-2"), 50).await.unwrap();
        assert!(page.messages.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let history = HttpHistory::new(server.uri(), Some("expired")).unwrap();
        let err = history.fetch_page(&conv(), None, 10).await.unwrap_err();
        assert!(matches!(err, TetherError::Authentication { .. }));
    }

    #[tokio::test]
    async fn server_error_is_a_connection_error_with_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let history = HttpHistory::new(server.uri(), None).unwrap();
        let err = history.fetch_page(&conv(), None, 10).await.unwrap_err();
        assert_eq!(err.code(), Some("history_http_status"));
        assert!(err.to_string().contains("maintenance"));
        assert_eq!(
            err.context().unwrap().metadata.get("status").map(String::as_str),
            Some("503")
        );
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let history = HttpHistory::new(server.uri(), None).unwrap();
        let err = history.fetch_page(&conv(), None, 10).await.unwrap_err();
        assert_eq!(err.code(), Some("history_decode_failed"));
    }

    #[test]
    fn from_config_is_none_without_base_url() {
        let mut config = TetherConfig::default();
        assert!(HttpHistory::from_config(&config).unwrap().is_none());
        config.history.base_url = Some("https://chat.example.com/".into());
        let history = HttpHistory::from_config(&config).unwrap().unwrap();
        assert_eq!(history.base_url(), "https://chat.example.com");
    }
}
