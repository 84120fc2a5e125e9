//! Bounded delivery attempts.
//!
//! An encoded notice is posted up to [`RetryPolicy::max_attempts`] times.
//! Only HTTP 201 counts as accepted; any other status and any transport
//! failure are logged with the attempt index and followed by the next
//! attempt. Exhaustion is terminal: the notice is dropped and logged.

use std::{fmt, time::Duration};

use bytes::Bytes;
use reqwest::Url;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    client::{DeliveryRequest, Transport, TransportResponse},
    error::{DeliveryError, Result},
    DEFAULT_MAX_ATTEMPTS,
};

/// The only status the notices API uses to acknowledge a notice.
pub const ACCEPTED_STATUS: u16 = 201;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Fixed pause between consecutive attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, retry_delay: Duration::ZERO }
    }
}

/// Where and as whom a notice is posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    /// Notices endpoint.
    pub endpoint: Url,
    /// Project API key.
    pub api_key: Option<String>,
}

/// Result of one attempt.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// The endpoint answered 201.
    Delivered,
    /// The endpoint answered with any other status.
    Rejected(u16),
    /// No response was obtained.
    TransportFailure(DeliveryError),
}

impl DeliveryOutcome {
    /// Classifies the result of one transport call.
    pub fn classify(result: Result<TransportResponse>) -> Self {
        match result {
            Ok(response) if response.status_code == ACCEPTED_STATUS => Self::Delivered,
            Ok(response) => Self::Rejected(response.status_code),
            Err(e) => Self::TransportFailure(e),
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Rejected(status) => write!(f, "rejected with HTTP {status}"),
            Self::TransportFailure(e) => write!(f, "transport failure: {e}"),
        }
    }
}

/// Terminal state of one event.
#[derive(Debug, Clone)]
pub enum DeliveryStatus {
    /// Accepted by the endpoint.
    Delivered {
        /// Attempts used, at least 1.
        attempts: u32,
    },
    /// Dropped because its class is excluded; nothing was sent.
    Excluded,
    /// Every attempt failed.
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Outcome of the final attempt.
        last: DeliveryOutcome,
    },
    /// The payload could not be encoded; nothing was sent.
    Unencodable {
        /// Encoder error.
        reason: String,
    },
}

impl DeliveryStatus {
    /// Whether the endpoint accepted the notice.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Number of network attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts } | Self::Exhausted { attempts, .. } => *attempts,
            Self::Excluded | Self::Unencodable { .. } => 0,
        }
    }
}

/// Posts `body` until it is accepted or the policy is exhausted.
pub async fn deliver(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    target: &DeliveryTarget,
    event_id: Uuid,
    body: Bytes,
) -> DeliveryStatus {
    let max_attempts = policy.max_attempts.max(1);
    let mut last = DeliveryOutcome::Rejected(0);

    for attempt in 1..=max_attempts {
        if attempt > 1 && !policy.retry_delay.is_zero() {
            tokio::time::sleep(policy.retry_delay).await;
        }

        let request = DeliveryRequest {
            event_id,
            endpoint: target.endpoint.clone(),
            api_key: target.api_key.clone(),
            body: body.clone(),
            attempt_number: attempt,
        };

        let outcome = DeliveryOutcome::classify(transport.post(&request).await);
        match &outcome {
            DeliveryOutcome::Delivered => {
                info!(%event_id, attempt, "notice delivered");
                return DeliveryStatus::Delivered { attempts: attempt };
            },
            DeliveryOutcome::Rejected(status) => {
                warn!(%event_id, attempt, max_attempts, status, "notice rejected");
            },
            DeliveryOutcome::TransportFailure(e) => {
                warn!(%event_id, attempt, max_attempts, error = %e, "notice delivery failed");
            },
        }
        last = outcome;
    }

    error!(%event_id, attempts = max_attempts, last = %last, "giving up on notice");
    debug!(%event_id, "notice dropped");
    DeliveryStatus::Exhausted { attempts: max_attempts, last }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicU32, Ordering},
            Mutex,
        },
    };

    use async_trait::async_trait;

    use super::*;

    struct Scripted {
        script: Mutex<VecDeque<Result<u16>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(script: impl IntoIterator<Item = Result<u16>>) -> Self {
            Self { script: Mutex::new(script.into_iter().collect()), calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn post(&self, request: &DeliveryRequest) -> Result<TransportResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(request.attempt_number, call);
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(500));
            next.map(|status_code| TransportResponse { status_code, duration: Duration::ZERO })
        }
    }

    fn target() -> DeliveryTarget {
        DeliveryTarget {
            endpoint: Url::parse("http://localhost/v1/notices").unwrap(),
            api_key: Some("key".to_string()),
        }
    }

    #[tokio::test]
    async fn first_accepted_attempt_stops_delivery() {
        let transport = Scripted::new([Ok(201)]);

        let status =
            deliver(&transport, &RetryPolicy::default(), &target(), Uuid::new_v4(), Bytes::new())
                .await;

        assert!(matches!(status, DeliveryStatus::Delivered { attempts: 1 }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_after_rejection_and_transport_failure() {
        let transport =
            Scripted::new([Ok(500), Err(DeliveryError::network("connection reset")), Ok(201)]);

        let status =
            deliver(&transport, &RetryPolicy::default(), &target(), Uuid::new_v4(), Bytes::new())
                .await;

        assert!(matches!(status, DeliveryStatus::Delivered { attempts: 3 }));
    }

    #[tokio::test]
    async fn other_success_codes_are_not_acceptance() {
        let transport = Scripted::new([Ok(200), Ok(204), Ok(202)]);

        let status =
            deliver(&transport, &RetryPolicy::default(), &target(), Uuid::new_v4(), Bytes::new())
                .await;

        assert!(matches!(
            status,
            DeliveryStatus::Exhausted { attempts: 3, last: DeliveryOutcome::Rejected(202) }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_stops_at_max_attempts() {
        let transport = Scripted::new(Vec::<Result<u16>>::new());
        let policy = RetryPolicy { max_attempts: 5, ..RetryPolicy::default() };

        let status = deliver(&transport, &policy, &target(), Uuid::new_v4(), Bytes::new()).await;

        assert_eq!(status.attempts(), 5);
        assert!(!status.is_delivered());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn retry_delay_separates_attempts() {
        let transport = Scripted::new([Ok(500), Ok(201)]);
        let policy =
            RetryPolicy { retry_delay: Duration::from_millis(30), ..RetryPolicy::default() };
        let started = tokio::time::Instant::now();

        let status = deliver(&transport, &policy, &target(), Uuid::new_v4(), Bytes::new()).await;

        assert!(status.is_delivered());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn outcome_classification() {
        let response = |status_code| Ok(TransportResponse { status_code, duration: Duration::ZERO });

        assert!(matches!(DeliveryOutcome::classify(response(201)), DeliveryOutcome::Delivered));
        assert!(matches!(DeliveryOutcome::classify(response(200)), DeliveryOutcome::Rejected(200)));
        assert!(matches!(
            DeliveryOutcome::classify(Err(DeliveryError::timeout(10))),
            DeliveryOutcome::TransportFailure(DeliveryError::Timeout { .. })
        ));
    }
}
