//! Automatic signature acquisition
//!
//! Providers that authenticate with a short-lived signature (Zoom) call a
//! [`TokenProvider`] when the join request carries none. Any failure here is
//! reported as [`SessionError::TokenAcquisitionFailed`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};
use crate::types::Role;

/// Parameters sent to the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub topic: String,
    pub user_name: String,
    pub role: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}

impl TokenRequest {
    pub fn new(topic: impl Into<String>, user_name: impl Into<String>, role: Role) -> Self {
        Self {
            topic: topic.into(),
            user_name: user_name.into(),
            role: role.as_number(),
            session_key: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    signature: String,
}

/// Source of join signatures
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch(&self, request: &TokenRequest) -> SessionResult<String>;
}

/// Fetches signatures from an HTTP endpoint
///
/// Posts the [`TokenRequest`] as JSON and expects `{"signature": "..."}` back.
pub struct HttpTokenProvider {
    client: reqwest::Client,
    endpoint: url::Url,
}

impl HttpTokenProvider {
    pub fn new(endpoint: &str) -> SessionResult<Self> {
        Self::with_timeout(endpoint, Duration::from_secs(10))
    }

    pub fn with_timeout(endpoint: &str, timeout: Duration) -> SessionResult<Self> {
        let endpoint = url::Url::parse(endpoint)
            .map_err(|e| SessionError::invalid_configuration("token_endpoint", e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::internal_error(format!("http client: {}", e)))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch(&self, request: &TokenRequest) -> SessionResult<String> {
        debug!(endpoint = %self.endpoint, topic = %request.topic, "Requesting join signature");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| SessionError::token_acquisition_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Token endpoint rejected request");
            return Err(SessionError::token_acquisition_failed(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| SessionError::token_acquisition_failed(format!("malformed response: {}", e)))?;

        if body.signature.is_empty() {
            return Err(SessionError::token_acquisition_failed("empty signature"));
        }
        Ok(body.signature)
    }
}

/// Returns a fixed signature
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    signature: String,
}

impl StaticTokenProvider {
    pub fn new(signature: impl Into<String>) -> Self {
        Self {
            signature: signature.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch(&self, _request: &TokenRequest) -> SessionResult<String> {
        Ok(self.signature.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_provider_posts_request_and_reads_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_json(serde_json::json!({
                "topic": "t1",
                "userName": "42",
                "role": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signature": "sig-abc"
            })))
            .mount(&server)
            .await;

        let provider = HttpTokenProvider::new(&format!("{}/token", server.uri())).unwrap();
        let signature = provider
            .fetch(&TokenRequest::new("t1", "42", Role::Host))
            .await
            .unwrap();
        assert_eq!(signature, "sig-abc");
    }

    #[tokio::test]
    async fn http_provider_maps_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = HttpTokenProvider::new(&server.uri()).unwrap();
        let err = provider
            .fetch(&TokenRequest::new("t1", "42", Role::Participant))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::TokenAcquisitionFailed { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn static_provider_ignores_request() {
        let provider = StaticTokenProvider::new("fixed");
        let signature =
            tokio_test::block_on(provider.fetch(&TokenRequest::new("any", "bob", Role::Participant)));
        assert_eq!(signature.unwrap(), "fixed");
    }

    #[test]
    fn invalid_endpoint_is_a_configuration_error() {
        assert!(matches!(
            HttpTokenProvider::new("not a url"),
            Err(SessionError::InvalidConfiguration { .. })
        ));
    }
}
