//! HTTP transport for notice delivery with configurable timeouts.
//!
//! One [`HttpTransport`] wraps one pooled `reqwest::Client`; clones share
//! the pool, so every attempt from every worker reuses connections.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Url,
};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::{
    error::{DeliveryError, Result},
    DEFAULT_REQUEST_TIMEOUT_MS,
};

/// Header carrying the project API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

const JSON: &str = "application/json";

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for a whole request, connect included.
    pub timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("{}/{}", badger_core::NOTIFIER_NAME, badger_core::NOTIFIER_VERSION),
        }
    }
}

/// A single POST of an encoded notice.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Event being delivered.
    pub event_id: Uuid,
    /// Notices endpoint.
    pub endpoint: Url,
    /// Project API key, sent as [`API_KEY_HEADER`].
    pub api_key: Option<String>,
    /// Encoded JSON payload.
    pub body: Bytes,
    /// 1-based attempt number.
    pub attempt_number: u32,
}

/// Response to one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Total duration of the request.
    pub duration: Duration,
}

/// Sends encoded notices over the network.
///
/// Implementations must be cheap to share across workers. Any HTTP status
/// is an `Ok` response; only failures to obtain a response are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one POST.
    async fn post(&self, request: &DeliveryRequest) -> Result<TransportResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post(&self, request: &DeliveryRequest) -> Result<TransportResponse> {
        (**self).post(request).await
    }
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Creates a transport with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// Configuration the underlying client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, request: &DeliveryRequest) -> Result<TransportResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "notice_post",
            event_id = %request.event_id,
            endpoint = %request.endpoint,
            attempt = request.attempt_number
        );

        async move {
            let mut http_request = self
                .client
                .post(request.endpoint.clone())
                .header(ACCEPT, JSON)
                .header(CONTENT_TYPE, JSON)
                .body(request.body.clone());

            if let Some(api_key) = request.api_key.as_deref() {
                http_request = http_request.header(API_KEY_HEADER, api_key);
            }

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::debug!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(
                            u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
                        ));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let status_code = response.status().as_u16();

            tracing::debug!(
                status = status_code,
                duration_ms = duration.as_millis(),
                "received response"
            );

            Ok(TransportResponse { status_code, duration })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn create_test_request(uri: &str) -> DeliveryRequest {
        DeliveryRequest {
            event_id: Uuid::new_v4(),
            endpoint: Url::parse(&format!("{uri}/v1/notices")).unwrap(),
            api_key: Some("abc123".to_string()),
            body: Bytes::from_static(b"{\"error\":{}}"),
            attempt_number: 1,
        }
    }

    #[tokio::test]
    async fn posts_json_with_api_key() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/v1/notices"))
            .and(matchers::header("X-API-Key", "abc123"))
            .and(matchers::header("Accept", "application/json"))
            .and(matchers::header("Content-Type", "application/json"))
            .and(matchers::body_string("{\"error\":{}}"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let response = transport.post(&create_test_request(&mock_server.uri())).await.unwrap();

        assert_eq!(response.status_code, 201);
    }

    #[tokio::test]
    async fn non_success_status_is_a_response_not_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        let response = transport.post(&create_test_request(&mock_server.uri())).await.unwrap();

        assert_eq!(response.status_code, 503);
    }

    #[tokio::test]
    async fn user_agent_identifies_the_notifier() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::header(
                "User-Agent",
                format!("badger-rust/{}", badger_core::NOTIFIER_VERSION).as_str(),
            ))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::with_defaults().unwrap();
        transport.post(&create_test_request(&mock_server.uri())).await.unwrap();
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let transport = HttpTransport::new(ClientConfig {
            timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        })
        .unwrap();
        let error = transport.post(&create_test_request(&mock_server.uri())).await.unwrap_err();

        assert!(matches!(error, DeliveryError::Timeout { timeout_ms: 50 }));
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let uri = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport = HttpTransport::with_defaults().unwrap();
        let error = transport.post(&create_test_request(&uri)).await.unwrap_err();

        assert!(matches!(error, DeliveryError::NetworkError { .. }));
    }
}
