//! One event through exclusion, serialization and delivery.

use std::sync::Arc;

use badger_core::{ErrorEvent, Serializer};
use bytes::Bytes;
use tracing::{debug, error, info_span, Instrument};

use crate::{
    client::Transport,
    retry::{deliver, DeliveryStatus, DeliveryTarget, RetryPolicy},
};

/// Everything a worker, or a synchronous caller, needs to deliver one event.
///
/// Shared immutably by all workers.
#[derive(Clone)]
pub struct Dispatcher {
    serializer: Serializer,
    transport: Arc<dyn Transport>,
    target: DeliveryTarget,
    policy: RetryPolicy,
}

impl Dispatcher {
    /// Creates a dispatcher with the default retry policy.
    pub fn new(serializer: Serializer, transport: Arc<dyn Transport>, target: DeliveryTarget) -> Self {
        Self { serializer, transport, target, policy: RetryPolicy::default() }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Delivers `event` and reports its terminal state.
    ///
    /// Excluded classes stop here: nothing is serialized and no request is
    /// made. Never fails; every failure is logged and reflected in the
    /// returned status.
    pub async fn dispatch(&self, event: &ErrorEvent) -> DeliveryStatus {
        let span = info_span!("dispatch", event_id = %event.id(), class = event.class_name());

        async move {
            if self.serializer.exclusions().is_excluded_class(event.class_name()) {
                debug!("exception class excluded, dropping notice");
                return DeliveryStatus::Excluded;
            }

            let payload = self.serializer.serialize(event);
            let body = match serde_json::to_vec(&payload) {
                Ok(body) => Bytes::from(body),
                Err(e) => {
                    error!(error = %e, "failed to encode notice");
                    return DeliveryStatus::Unencodable { reason: e.to_string() };
                },
            };

            deliver(self.transport.as_ref(), &self.policy, &self.target, event.id(), body).await
        }
        .instrument(span)
        .await
    }

    /// Serializer bound to this dispatcher.
    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    /// Destination of every notice.
    pub fn target(&self) -> &DeliveryTarget {
        &self.target
    }

    /// Retry policy applied to every notice.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("serializer", &self.serializer)
            .field("target", &self.target)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use badger_core::{Exception, ExclusionSets, ServerInfo, SystemProperties};
    use reqwest::Url;

    use super::*;
    use crate::{
        client::{DeliveryRequest, TransportResponse},
        error::Result,
    };

    #[derive(Default)]
    struct Capture {
        bodies: Mutex<Vec<Bytes>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Capture {
        async fn post(&self, request: &DeliveryRequest) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(request.body.clone());
            Ok(TransportResponse { status_code: 201, duration: Duration::ZERO })
        }
    }

    fn dispatcher(transport: Arc<Capture>, excluded_classes: &str) -> Dispatcher {
        let exclusions = ExclusionSets::from_lists(None, Some(excluded_classes));
        let server = ServerInfo {
            environment_name: "test".to_string(),
            hostname: "localhost".to_string(),
            runtime_root: "/".to_string(),
            system_properties: SystemProperties::new(),
        };
        Dispatcher::new(
            Serializer::new(Arc::new(exclusions), Arc::new(server)),
            transport,
            DeliveryTarget {
                endpoint: Url::parse("http://localhost/v1/notices").unwrap(),
                api_key: None,
            },
        )
    }

    #[tokio::test]
    async fn excluded_class_never_reaches_transport() {
        let transport = Arc::new(Capture::default());
        let dispatcher = dispatcher(transport.clone(), "app::Ignored");

        let status = dispatcher.dispatch(&ErrorEvent::new(Exception::new("app::Ignored"))).await;

        assert!(matches!(status, DeliveryStatus::Excluded));
        assert_eq!(status.attempts(), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn own_error_type_is_always_excluded() {
        let transport = Arc::new(Capture::default());
        let dispatcher = dispatcher(transport.clone(), "");

        let event = ErrorEvent::from_error(&crate::DeliveryError::QueueClosed);
        let status = dispatcher.dispatch(&event).await;

        assert!(matches!(status, DeliveryStatus::Excluded));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn posts_the_serialized_payload() {
        let transport = Arc::new(Capture::default());
        let dispatcher = dispatcher(transport.clone(), "");

        let status = dispatcher
            .dispatch(&ErrorEvent::new(Exception::new("app::Error").with_message("boom")))
            .await;

        assert!(status.is_delivered());
        let bodies = transport.bodies.lock().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(json["error"]["class"], "app::Error");
        assert_eq!(json["error"]["message"], "boom");
        assert_eq!(json["notifier"]["name"], badger_core::NOTIFIER_NAME);
    }
}
