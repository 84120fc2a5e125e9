//! In-memory transport that records every request.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use badger_delivery::{DeliveryError, DeliveryRequest, Transport, TransportResponse};
use serde_json::Value;

/// Scripted reply for one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this HTTP status.
    Status(u16),
    /// Fail without a response.
    Fail(DeliveryError),
}

/// [`Transport`] double with scripted replies and an optional delay.
///
/// Replies are consumed in order; once the script is empty every request
/// gets the default status.
#[derive(Debug)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<Reply>>,
    default_status: u16,
    delay: Duration,
    requests: Mutex<Vec<DeliveryRequest>>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::always(201)
    }
}

impl RecordingTransport {
    /// Accepts every notice.
    pub fn accepting() -> Self {
        Self::default()
    }

    /// Answers every request with `status`.
    pub fn always(status: u16) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_status: status,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order before falling back to the default status.
    #[must_use]
    pub fn with_script(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.script.lock().unwrap_or_else(PoisonError::into_inner).extend(replies);
        self
    }

    /// Waits `delay` before answering each request.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<DeliveryRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of requests seen so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Request bodies decoded as JSON.
    ///
    /// # Panics
    ///
    /// Panics if a body is not valid JSON.
    pub fn notices(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).expect("notice body is JSON"))
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, request: &DeliveryRequest) -> badger_delivery::Result<TransportResponse> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());
        let reply = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply.unwrap_or(Reply::Status(self.default_status)) {
            Reply::Status(status_code) => Ok(TransportResponse { status_code, duration: self.delay }),
            Reply::Fail(error) => Err(error),
        }
    }
}
