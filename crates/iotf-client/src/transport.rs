//! MQTT transport seam.
//!
//! The handle talks to the broker only through [`Transport`], so session
//! logic can be tested against [`MockTransport`](crate::mock::MockTransport).
//! [`MqttTransport`] is the production implementation over `rumqttc`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use iotf_protocol::QoS;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, Publish, SubscribeReasonCode, TlsConfiguration,
};

use crate::bootstrap::{Endpoint, TlsContext};
use crate::error::{TransportError, TransportResult};
use crate::settings::ClientSettings;

/// Capacity of the request channel between `AsyncClient` and its event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// A message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl From<Publish> for InboundMessage {
    fn from(publish: Publish) -> Self {
        Self {
            topic: publish.topic,
            payload: publish.payload.to_vec(),
        }
    }
}

/// Connection to an MQTT broker.
///
/// Every call completes only once the broker confirmed it (CONNACK,
/// PUBACK/PUBCOMP, SUBACK) or the transport gave up.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self, endpoint: &Endpoint) -> TransportResult<()>;

    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> TransportResult<()>;

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> TransportResult<()>;

    /// Wait up to `timeout` for inbound messages.
    ///
    /// An empty vec means nothing arrived. An error means the connection
    /// is gone.
    async fn poll(&mut self, timeout: Duration) -> TransportResult<Vec<InboundMessage>>;

    async fn disconnect(&mut self) -> TransportResult<()>;

    fn is_connected(&self) -> bool;
}

struct Link {
    client: AsyncClient,
    eventloop: EventLoop,
}

/// `rumqttc`-backed transport.
///
/// The event loop is driven inline by whichever call is waiting on the
/// broker; publishes that arrive meanwhile are queued for the next `poll`.
pub struct MqttTransport {
    link: Option<Link>,
    pending: VecDeque<InboundMessage>,
    operation_timeout: Duration,
}

impl MqttTransport {
    pub fn new(operation_timeout: Duration) -> Self {
        Self {
            link: None,
            pending: VecDeque::new(),
            operation_timeout,
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.operation_timeout())
    }

    /// Drive the event loop until `expect` is satisfied.
    async fn drive(&mut self, mut expect: Expect) -> TransportResult<()> {
        let Some(link) = self.link.as_mut() else {
            return Err(TransportError::NotConnected);
        };
        let pending = &mut self.pending;

        // Outer error: the link is dead. Inner error: the broker refused
        // the request but the link is fine.
        let outcome = tokio::time::timeout(self.operation_timeout, async {
            loop {
                match link.eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        pending.push_back(publish.into());
                    }
                    Ok(event) => {
                        if let Some(result) = expect.check(&event) {
                            return Ok(result);
                        }
                    }
                    Err(e) => return Err(classify(e)),
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "MQTT connection lost");
                self.link = None;
                Err(e)
            }
            Err(_) => Err(TransportError::Network(format!(
                "no {} within {:?}",
                expect.describe(),
                self.operation_timeout
            ))),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, endpoint: &Endpoint) -> TransportResult<()> {
        self.link = None;
        self.pending.clear();

        let mut options = MqttOptions::new(&endpoint.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(endpoint.keep_alive);
        options.set_clean_session(true);
        if let Some(credentials) = &endpoint.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }
        options.set_transport(wire_transport(&endpoint.tls));

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let handshake = tokio::time::timeout(endpoint.connect_timeout, async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return match ack.code {
                            ConnectReturnCode::Success => Ok(()),
                            code => Err(refused(code)),
                        };
                    }
                    Ok(_) => {}
                    Err(e) => return Err(classify(e)),
                }
            }
        })
        .await;

        match handshake {
            Ok(Ok(())) => {
                tracing::debug!(
                    host = %endpoint.host,
                    port = endpoint.port,
                    client_id = %endpoint.client_id,
                    "MQTT session established"
                );
                self.link = Some(Link { client, eventloop });
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(TransportError::Network(format!(
                "no CONNACK from {}:{} within {:?}",
                endpoint.host, endpoint.port, endpoint.connect_timeout
            ))),
        }
    }

    async fn publish(&mut self, topic: &str, payload: &[u8], qos: QoS) -> TransportResult<()> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.client
            .publish(topic, mqtt_qos(qos), false, payload.to_vec())
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        self.drive(Expect::for_publish(qos)).await
    }

    async fn subscribe(&mut self, filter: &str, qos: QoS) -> TransportResult<()> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.client
            .subscribe(filter, mqtt_qos(qos))
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        self.drive(Expect::SubAck(None)).await
    }

    async fn poll(&mut self, timeout: Duration) -> TransportResult<Vec<InboundMessage>> {
        if !self.pending.is_empty() {
            return Ok(self.pending.drain(..).collect());
        }
        let Some(link) = self.link.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, link.eventloop.poll()).await {
                Err(_) => return Ok(Vec::new()),
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    return Ok(vec![publish.into()]);
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    let err = classify(e);
                    tracing::warn!(error = %err, "MQTT connection lost");
                    self.link = None;
                    return Err(err);
                }
            }
        }
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        self.pending.clear();
        let Some(link) = self.link.as_ref() else {
            return Ok(());
        };
        let sent = link.client.disconnect().await;
        let result = match sent {
            Ok(()) => self.drive(Expect::Disconnect).await,
            Err(e) => Err(TransportError::Network(e.to_string())),
        };
        self.link = None;
        result
    }

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }
}

/// Event that completes a pending request.
///
/// Acknowledged requests learn their packet id from the outgoing packet
/// and then only complete on the ack carrying that id. Late acks for
/// requests that already timed out are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// QoS 0 publish written to the socket.
    Sent,
    PubAck(Option<u16>),
    PubComp(Option<u16>),
    SubAck(Option<u16>),
    Disconnect,
}

impl Expect {
    fn for_publish(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::Sent,
            QoS::AtLeastOnce => Self::PubAck(None),
            QoS::ExactlyOnce => Self::PubComp(None),
        }
    }

    fn check(&mut self, event: &Event) -> Option<TransportResult<()>> {
        match (self, event) {
            (Self::Sent, Event::Outgoing(Outgoing::Publish(_)))
            | (Self::Disconnect, Event::Outgoing(Outgoing::Disconnect)) => Some(Ok(())),
            (
                Self::PubAck(awaited @ None) | Self::PubComp(awaited @ None),
                Event::Outgoing(Outgoing::Publish(pkid)),
            )
            | (Self::SubAck(awaited @ None), Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                *awaited = Some(*pkid);
                None
            }
            (Self::PubAck(Some(awaited)), Event::Incoming(Packet::PubAck(ack)))
                if ack.pkid == *awaited =>
            {
                Some(Ok(()))
            }
            (Self::PubComp(Some(awaited)), Event::Incoming(Packet::PubComp(ack)))
                if ack.pkid == *awaited =>
            {
                Some(Ok(()))
            }
            (Self::SubAck(Some(awaited)), Event::Incoming(Packet::SubAck(ack)))
                if ack.pkid == *awaited =>
            {
                let refused = ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                Some(if refused {
                    Err(TransportError::Rejected("broker returned failure in SUBACK".into()))
                } else {
                    Ok(())
                })
            }
            (_, Event::Incoming(Packet::PubAck(_) | Packet::PubComp(_) | Packet::SubAck(_))) => {
                tracing::debug!(?event, "ignoring ack for an earlier request");
                None
            }
            _ => None,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Sent => "publish flush",
            Self::PubAck(_) => "PUBACK",
            Self::PubComp(_) => "PUBCOMP",
            Self::SubAck(_) => "SUBACK",
            Self::Disconnect => "DISCONNECT flush",
        }
    }
}

fn wire_transport(tls: &TlsContext) -> rumqttc::Transport {
    match tls {
        TlsContext::Plaintext => rumqttc::Transport::Tcp,
        TlsContext::ServerAuth { ca: None } => rumqttc::Transport::tls_with_default_config(),
        TlsContext::ServerAuth { ca: Some(ca) } => {
            rumqttc::Transport::tls_with_config(TlsConfiguration::Simple {
                ca: ca.clone(),
                alpn: None,
                client_auth: None,
            })
        }
        TlsContext::Mutual {
            ca,
            client_cert,
            client_key,
        } => rumqttc::Transport::tls_with_config(TlsConfiguration::Simple {
            ca: ca.clone(),
            alpn: None,
            client_auth: Some((client_cert.clone(), client_key.clone())),
        }),
    }
}

fn classify(err: ConnectionError) -> TransportError {
    match err {
        ConnectionError::ConnectionRefused(code) => refused(code),
        ConnectionError::Tls(e) => TransportError::Tls(e.to_string()),
        other => TransportError::Network(other.to_string()),
    }
}

fn refused(code: ConnectReturnCode) -> TransportError {
    match code {
        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
            TransportError::Auth(format!("connection refused: {code:?}"))
        }
        other => TransportError::Network(format!("connection refused: {other:?}")),
    }
}

fn mqtt_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{PubAck, PubComp, SubAck};

    #[test]
    fn refused_credentials_are_auth_errors() {
        assert!(matches!(
            refused(ConnectReturnCode::NotAuthorized),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            refused(ConnectReturnCode::BadUserNamePassword),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            refused(ConnectReturnCode::ServiceUnavailable),
            TransportError::Network(_)
        ));
    }

    #[test]
    fn io_failures_are_network_errors() {
        let err = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(classify(err), TransportError::Network(_)));
    }

    #[test]
    fn qos_maps_one_to_one() {
        assert_eq!(mqtt_qos(QoS::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(mqtt_qos(QoS::AtLeastOnce), rumqttc::QoS::AtLeastOnce);
        assert_eq!(mqtt_qos(QoS::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
    }

    #[test]
    fn publish_completion_depends_on_qos() {
        let flushed = Event::Outgoing(Outgoing::Publish(1));
        let puback = Event::Incoming(Packet::PubAck(PubAck::new(1)));
        let pubcomp = Event::Incoming(Packet::PubComp(PubComp::new(1)));

        assert!(Expect::for_publish(QoS::AtMostOnce).check(&flushed).is_some());
        assert!(Expect::for_publish(QoS::AtMostOnce).check(&puback).is_none());

        let mut at_least_once = Expect::for_publish(QoS::AtLeastOnce);
        assert!(at_least_once.check(&flushed).is_none());
        assert!(matches!(at_least_once.check(&puback), Some(Ok(()))));

        let mut exactly_once = Expect::for_publish(QoS::ExactlyOnce);
        assert!(exactly_once.check(&flushed).is_none());
        assert!(exactly_once.check(&puback).is_none());
        assert!(matches!(exactly_once.check(&pubcomp), Some(Ok(()))));
    }

    #[test]
    fn late_ack_for_earlier_publish_is_ignored() {
        // Packet 1 timed out earlier; this request went out as packet 2.
        let mut expect = Expect::for_publish(QoS::AtLeastOnce);
        assert!(expect.check(&Event::Outgoing(Outgoing::Publish(2))).is_none());
        assert_eq!(expect, Expect::PubAck(Some(2)));

        let stale = Event::Incoming(Packet::PubAck(PubAck::new(1)));
        assert!(expect.check(&stale).is_none());

        let own = Event::Incoming(Packet::PubAck(PubAck::new(2)));
        assert!(matches!(expect.check(&own), Some(Ok(()))));
    }

    #[test]
    fn ack_before_outgoing_packet_is_ignored() {
        let mut expect = Expect::for_publish(QoS::AtLeastOnce);
        let ack = Event::Incoming(Packet::PubAck(PubAck::new(7)));
        assert!(expect.check(&ack).is_none());
        assert_eq!(expect, Expect::PubAck(None));
    }

    #[test]
    fn suback_must_match_subscribe_packet() {
        let mut expect = Expect::SubAck(None);
        assert!(expect.check(&Event::Outgoing(Outgoing::Subscribe(4))).is_none());

        let other = Event::Incoming(Packet::SubAck(SubAck::new(
            3,
            vec![SubscribeReasonCode::Failure],
        )));
        assert!(expect.check(&other).is_none());

        let own = Event::Incoming(Packet::SubAck(SubAck::new(
            4,
            vec![SubscribeReasonCode::Success(rumqttc::QoS::AtMostOnce)],
        )));
        assert!(matches!(expect.check(&own), Some(Ok(()))));
    }

    #[test]
    fn suback_failure_is_rejection() {
        let failed = Event::Incoming(Packet::SubAck(SubAck::new(
            1,
            vec![SubscribeReasonCode::Failure],
        )));
        let mut expect = Expect::SubAck(Some(1));
        assert!(matches!(
            expect.check(&failed),
            Some(Err(TransportError::Rejected(_)))
        ));
    }

    #[tokio::test]
    async fn operations_before_connect_fail_fast() {
        let mut transport = MqttTransport::new(Duration::from_secs(1));
        assert!(!transport.is_connected());
        assert_eq!(
            transport.publish("iot-2/evt/status/fmt/json", b"{}", QoS::AtMostOnce).await,
            Err(TransportError::NotConnected)
        );
        assert_eq!(
            transport.subscribe("iot-2/cmd/+/fmt/+", QoS::AtMostOnce).await,
            Err(TransportError::NotConnected)
        );
        assert!(transport.poll(Duration::from_millis(1)).await.is_err());
        assert!(transport.disconnect().await.is_ok());
    }
}
