//! Mock notices endpoint backed by wiremock.

use std::time::Duration;

use http::StatusCode;
use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Path the mock endpoint listens on.
pub const NOTICES_PATH: &str = "/v1/notices";

/// HTTP mock server standing in for the notices API.
pub struct NoticeServer {
    server: MockServer,
}

impl NoticeServer {
    /// Starts a new mock server on a random port.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Full URL of the notices endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{NOTICES_PATH}", self.server.uri())
    }

    /// Answers every notice with `201 Created`.
    pub async fn accept_all(&self) {
        self.always(StatusCode::CREATED).await;
    }

    /// Answers every notice with `status`.
    pub async fn always(&self, status: StatusCode) {
        Mock::given(method("POST"))
            .and(path(NOTICES_PATH))
            .respond_with(ResponseTemplate::new(status.as_u16()))
            .mount(&self.server)
            .await;
    }

    /// Answers with each status once, in order.
    ///
    /// Mocks mounted earlier take precedence while they still have uses
    /// left, so the sequence is replayed exactly.
    pub async fn respond_in_sequence(&self, statuses: &[StatusCode]) {
        for status in statuses {
            Mock::given(method("POST"))
                .and(path(NOTICES_PATH))
                .respond_with(ResponseTemplate::new(status.as_u16()))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
    }

    /// Accepts notices after `delay`.
    pub async fn accept_after(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(NOTICES_PATH))
            .respond_with(ResponseTemplate::new(StatusCode::CREATED.as_u16()).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Requests received so far.
    pub async fn received(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Bodies of received notices decoded as JSON.
    ///
    /// # Panics
    ///
    /// Panics if a body is not valid JSON.
    pub async fn received_notices(&self) -> Vec<Value> {
        self.received()
            .await
            .iter()
            .map(|request| serde_json::from_slice(&request.body).expect("notice body is JSON"))
            .collect()
    }

    /// Waits until at least `count` requests arrived or `timeout` elapsed,
    /// then returns how many arrived.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = self.received().await.len();
            if received >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Asserts that exactly `expected` requests were received.
    pub async fn assert_request_count(&self, expected: usize) {
        let received = self.received().await.len();
        assert_eq!(received, expected, "expected {expected} requests, received {received}");
    }
}
