//! Mock MQTT transport for testing without a real broker.
//!
//! Records every connect, publish and subscription for assertion, and can
//! be scripted to refuse connects, drop the link, or inject inbound
//! messages. Clones share state, so a test keeps one clone while the
//! handle owns the other.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use iotf_protocol::QoS;

use crate::bootstrap::Endpoint;
use crate::error::{TransportError, TransportResult};
use crate::transport::{InboundMessage, Transport};

/// A recorded publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    connects: Vec<Endpoint>,
    connect_script: VecDeque<TransportResult<()>>,
    published: Vec<PublishedMessage>,
    publish_failures: VecDeque<TransportError>,
    subscriptions: Vec<(String, QoS)>,
    inbound: VecDeque<InboundMessage>,
    disconnects: usize,
    disconnect_failure: Option<TransportError>,
}

/// Mock implementation of [`Transport`].
///
/// Connects succeed unless scripted otherwise with
/// [`MockTransport::script_connect`].
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next connect attempt. Outcomes are consumed
    /// in order; once the queue is empty, connects succeed.
    pub fn script_connect(&self, result: TransportResult<()>) {
        self.state.lock().unwrap().connect_script.push_back(result);
    }

    /// Queue `n` consecutive connect failures with `err`.
    pub fn fail_connects(&self, n: usize, err: TransportError) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..n {
            state.connect_script.push_back(Err(err.clone()));
        }
    }

    /// Deliver a message on the next poll.
    pub fn push_inbound(&self, topic: &str, payload: &[u8]) {
        self.state.lock().unwrap().inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Simulate the broker dropping the connection.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.inbound.clear();
    }

    /// Fail the next publish with `err` without dropping the link.
    pub fn fail_next_publish(&self, err: TransportError) {
        self.state.lock().unwrap().publish_failures.push_back(err);
    }

    /// Fail the next disconnect with `err`. The link is closed regardless.
    pub fn fail_next_disconnect(&self, err: TransportError) {
        self.state.lock().unwrap().disconnect_failure = Some(err);
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().unwrap().published.clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.state.lock().unwrap().published.last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Every subscribe call, in order, including re-subscriptions after a
    /// reconnect.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .any(|(f, _)| f == filter)
    }

    /// Endpoints passed to every connect attempt, successful or not.
    pub fn connects(&self) -> Vec<Endpoint> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }

    /// Clear all recorded state. Scripted outcomes and the link status are
    /// kept.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.connects.clear();
        state.published.clear();
        state.subscriptions.clear();
        state.disconnects = 0;
    }

    fn take_inbound(&self) -> TransportResult<Vec<InboundMessage>> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::Network("connection lost".into()));
        }
        Ok(state.inbound.drain(..).collect())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, endpoint: &Endpoint) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(endpoint.clone());
        let result = state.connect_script.pop_front().unwrap_or(Ok(()));
        state.connected = result.is_ok();
        result
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::Network("connection lost".into()));
        }
        if let Some(err) = state.publish_failures.pop_front() {
            return Err(err);
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(TransportError::Network("connection lost".into()));
        }
        state.subscriptions.push((filter.to_string(), qos));
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> TransportResult<Vec<InboundMessage>> {
        let ready = self.take_inbound()?;
        if !ready.is_empty() {
            return Ok(ready);
        }
        tokio::time::sleep(timeout).await;
        self.take_inbound()
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        state.connected = false;
        state.disconnects += 1;
        match state.disconnect_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::TlsContext;

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "abc123.messaging.internetofthings.ibmcloud.com".into(),
            port: 8883,
            client_id: "d:abc123:thermostat:t-001".into(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            credentials: None,
            tls: TlsContext::ServerAuth { ca: None },
        }
    }

    #[tokio::test]
    async fn publish_records_messages() {
        let mut mock = MockTransport::new();
        mock.connect(&endpoint()).await.unwrap();
        mock.publish("iot-2/evt/a/fmt/json", b"hello", QoS::AtLeastOnce)
            .await
            .unwrap();
        mock.publish("iot-2/evt/b/fmt/json", b"world", QoS::AtMostOnce)
            .await
            .unwrap();

        let msgs = mock.published();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].topic, "iot-2/evt/a/fmt/json");
        assert_eq!(msgs[0].payload, b"hello");
        assert_eq!(msgs[1].qos, QoS::AtMostOnce);
        assert_eq!(mock.last_published().unwrap().payload_str(), "world");
        assert_eq!(mock.published_to("iot-2/evt/a/fmt/json").len(), 1);
    }

    #[tokio::test]
    async fn scripted_connect_failures_are_consumed_in_order() {
        let mut mock = MockTransport::new();
        mock.fail_connects(2, TransportError::Network("unreachable".into()));

        assert!(mock.connect(&endpoint()).await.is_err());
        assert!(mock.connect(&endpoint()).await.is_err());
        assert!(!mock.is_connected());
        assert!(mock.connect(&endpoint()).await.is_ok());
        assert!(mock.is_connected());
        assert_eq!(mock.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let observer = MockTransport::new();
        let mut mock = observer.clone();
        mock.connect(&endpoint()).await.unwrap();
        mock.subscribe("iot-2/cmd/+/fmt/+", QoS::AtMostOnce)
            .await
            .unwrap();

        assert!(observer.is_connected());
        assert!(observer.is_subscribed_to("iot-2/cmd/+/fmt/+"));
        assert!(!observer.is_subscribed_to("iot-2/cmd/reboot/fmt/json"));
    }

    #[tokio::test]
    async fn poll_returns_injected_messages() {
        let mut mock = MockTransport::new();
        mock.connect(&endpoint()).await.unwrap();
        mock.push_inbound("iot-2/cmd/reboot/fmt/json", b"{}");

        let msgs = mock.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].topic, "iot-2/cmd/reboot/fmt/json");

        assert!(mock.poll(Duration::from_millis(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_connection_fails_io() {
        let mut mock = MockTransport::new();
        mock.connect(&endpoint()).await.unwrap();
        mock.drop_connection();

        assert!(mock.poll(Duration::from_millis(1)).await.is_err());
        assert!(mock.publish("t", b"d", QoS::AtMostOnce).await.is_err());
        assert!(mock.published().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let mut mock = MockTransport::new();
        mock.connect(&endpoint()).await.unwrap();
        mock.publish("t", b"d", QoS::AtMostOnce).await.unwrap();
        mock.subscribe("f", QoS::AtLeastOnce).await.unwrap();
        mock.disconnect().await.unwrap();

        mock.reset();
        assert!(mock.published().is_empty());
        assert!(mock.subscriptions().is_empty());
        assert_eq!(mock.connect_attempts(), 0);
        assert_eq!(mock.disconnects(), 0);
    }
}
